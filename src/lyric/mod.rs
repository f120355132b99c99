use std::path::Path;
use std::sync::OnceLock;

use anyhow::{bail, Context, Result};
use id3::frame::{Lyrics, SynchronisedLyrics, SynchronisedLyricsType, TimestampFormat};
use id3::TagLike;
use regex::Regex;

/// One timed lyric line. `millis` is the position before any
/// `[offset:]` correction is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricLine {
    pub millis: i64,
    pub text: String,
}

/// A parsed LRC document plus the language descriptor taken from the
/// sidecar's secondary filename suffix (`song.en.lrc` -> `en`).
#[derive(Debug, Clone, Default)]
pub struct Lyric {
    pub lang_ext: String,
    /// Milliseconds from the `[offset:±n]` tag; positive shifts lines
    /// earlier, per LRC convention.
    pub offset: i64,
    pub lines: Vec<LyricLine>,
}

fn time_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[(\d+):(\d{1,2})(?:\.(\d{1,3}))?\]").unwrap())
}

fn offset_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[offset:\s*([+-]?\d+)\s*\]$").unwrap())
}

impl Lyric {
    /// Parses line-timed LRC content. A line may carry several time tags
    /// (one [`LyricLine`] each); metadata tags are skipped. Content with
    /// no timed line at all is rejected.
    pub fn from_lrc(content: &str) -> Result<Self> {
        let mut lyric = Lyric::default();

        for raw in content.lines() {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            if let Some(cap) = offset_tag_re().captures(raw) {
                lyric.offset = cap[1].parse().unwrap_or(0);
                continue;
            }

            let mut rest = raw;
            let mut stamps = Vec::new();
            while let Some(cap) = time_tag_re().captures(rest) {
                let minutes: i64 = cap[1].parse().unwrap_or(0);
                let seconds: i64 = cap[2].parse().unwrap_or(0);
                let frac = cap.get(3).map_or(0, |m| {
                    // ".3" means 300ms, ".34" 340ms, ".345" 345ms.
                    let digits = m.as_str();
                    let value: i64 = digits.parse().unwrap_or(0);
                    value * 10_i64.pow(3 - digits.len() as u32)
                });
                stamps.push(minutes * 60_000 + seconds * 1_000 + frac);
                rest = &rest[cap[0].len()..];
            }
            if stamps.is_empty() {
                // Metadata tag ([ar:], [ti:], ...) or stray prose.
                continue;
            }
            let text = rest.trim().to_string();
            for millis in stamps {
                lyric.lines.push(LyricLine {
                    millis,
                    text: text.clone(),
                });
            }
        }

        if lyric.lines.is_empty() {
            bail!("no timed lyric lines found");
        }
        lyric.lines.sort_by_key(|l| l.millis);
        Ok(lyric)
    }

    /// Offset-corrected timestamp of a line, clamped at zero.
    pub fn timestamp(&self, line: &LyricLine) -> u32 {
        (line.millis - self.offset).max(0) as u32
    }

    /// Serialises back to LRC text.
    pub fn as_lrc(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            let millis = self.timestamp(line);
            out.push_str(&format!(
                "[{:02}:{:02}.{:03}]{}\n",
                millis / 60_000,
                millis % 60_000 / 1_000,
                millis % 1_000,
                line.text
            ));
        }
        out
    }
}

/// Embeds `lyric` into the ID3 tag store of the audio file at `path`,
/// as a synchronised (SYLT) or plain (USLT) lyric frame carrying the
/// language descriptor.
pub fn embed_lyric(path: &Path, lyric: &Lyric, synchronised: bool) -> Result<()> {
    let mut tag = match id3::Tag::read_from_path(path) {
        Ok(tag) => tag,
        Err(err) if matches!(err.kind, id3::ErrorKind::NoTag) => id3::Tag::new(),
        Err(err) => {
            return Err(err).with_context(|| format!("unable to open tag of {}", path.display()))
        }
    };

    if synchronised {
        tag.add_frame(SynchronisedLyrics {
            lang: "eng".to_string(),
            timestamp_format: TimestampFormat::Ms,
            content_type: SynchronisedLyricsType::Lyrics,
            description: lyric.lang_ext.clone(),
            content: lyric
                .lines
                .iter()
                .map(|line| (lyric.timestamp(line), line.text.clone()))
                .collect(),
        });
    } else {
        tag.add_frame(Lyrics {
            lang: "eng".to_string(),
            description: lyric.lang_ext.clone(),
            text: lyric.as_lrc(),
        });
    }

    tag.write_to_path(path, id3::Version::Id3v24)
        .with_context(|| format!("unable to write tag of {}", path.display()))
}

/// Language descriptor of a sidecar file name: the suffix left once the
/// `.lrc` extension is stripped. `song.en.lrc` -> `en`, `song.lrc` -> ``.
pub fn language_descriptor(file_name: &str) -> String {
    let stem = file_name.strip_suffix(".lrc").unwrap_or(file_name);
    Path::new(stem)
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_timed_lines_in_order() {
        let lrc = "[ti:Some Song]\n[00:10.00]first\n[00:05.50]earlier\n";
        let lyric = Lyric::from_lrc(lrc).unwrap();

        assert_eq!(
            lyric.lines,
            vec![
                LyricLine {
                    millis: 5_500,
                    text: "earlier".into()
                },
                LyricLine {
                    millis: 10_000,
                    text: "first".into()
                },
            ]
        );
    }

    #[test]
    fn a_line_may_carry_several_time_tags() {
        let lrc = "[00:01.00][01:01.00]chorus\n";
        let lyric = Lyric::from_lrc(lrc).unwrap();
        assert_eq!(lyric.lines.len(), 2);
        assert_eq!(lyric.lines[0].millis, 1_000);
        assert_eq!(lyric.lines[1].millis, 61_000);
        assert!(lyric.lines.iter().all(|l| l.text == "chorus"));
    }

    #[test]
    fn fractional_part_normalises_to_millis() {
        let lyric = Lyric::from_lrc("[00:01.3]a\n[00:02.34]b\n[00:03.345]c\n").unwrap();
        let millis: Vec<_> = lyric.lines.iter().map(|l| l.millis).collect();
        assert_eq!(millis, [1_300, 2_340, 3_345]);
    }

    #[test]
    fn offset_shifts_timestamps_earlier_and_clamps() {
        let lyric = Lyric::from_lrc("[offset:+500]\n[00:00.30]a\n[00:02.00]b\n").unwrap();
        assert_eq!(lyric.offset, 500);
        assert_eq!(lyric.timestamp(&lyric.lines[0]), 0);
        assert_eq!(lyric.timestamp(&lyric.lines[1]), 1_500);
    }

    #[test]
    fn content_without_timed_lines_is_rejected() {
        assert!(Lyric::from_lrc("[ar:Somebody]\njust prose\n").is_err());
        assert!(Lyric::from_lrc("").is_err());
    }

    #[test]
    fn as_lrc_round_trips_timing() {
        let lyric = Lyric::from_lrc("[01:02.345]line\n").unwrap();
        let again = Lyric::from_lrc(&lyric.as_lrc()).unwrap();
        assert_eq!(again.lines, lyric.lines);
    }

    #[test]
    fn language_descriptor_comes_from_the_secondary_suffix() {
        assert_eq!(language_descriptor("song.en.lrc"), "en");
        assert_eq!(language_descriptor("song.zh-CN.lrc"), "zh-CN");
        assert_eq!(language_descriptor("song.lrc"), "");
    }
}
