use super::encoder::Frame;

/// Drops frames while muted. Holds no state: the caller passes the mute flag
/// as it stands when the frame is produced. A dropped frame is gone for good.
#[derive(Debug, Clone, Copy, Default)]
pub struct MuteGate;

impl MuteGate {
    pub fn forward(frame: Frame, muted: bool) -> Option<Frame> {
        if muted {
            None
        } else {
            Some(frame)
        }
    }
}
