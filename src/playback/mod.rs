use crate::queue::QueueTrack;

/// Contract the engine consumes from the playback side. The engine never
/// decodes or outputs audio; it only needs to know what is playing, ask
/// for a skip, and check whether playback is active.
pub trait Playback {
    fn current_song(&self) -> Option<QueueTrack>;
    fn skip(&mut self);
    fn is_running(&self) -> bool;
}
