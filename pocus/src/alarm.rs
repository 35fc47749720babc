use pocus_ipc::Mode;
use tracing::warn;

/// Cue played when an interval runs out. Fire-and-forget: failures never
/// reach the caller.
pub trait Alarm {
    fn ring(&self, finished: Mode, sound: &str, volume: f32);
}

/// Desktop notification carrying a sound hint.
pub struct DesktopAlarm;

impl Alarm for DesktopAlarm {
    fn ring(&self, finished: Mode, sound: &str, volume: f32) {
        let body = if finished.is_break() {
            "Break is over. Back to work!"
        } else {
            "Time for a break."
        };
        let mut notification = notify_rust::Notification::new();
        notification
            .summary(&format!("{} finished", finished.label()))
            .body(body)
            .appname("pocus");
        if volume > 0.0 && !sound.is_empty() {
            notification.sound_name(sound);
        }
        if let Err(e) = notification.show() {
            warn!("Failed to send notification: {}", e);
        }
    }
}

/// Stays silent.
pub struct NoAlarm;

impl Alarm for NoAlarm {
    fn ring(&self, _finished: Mode, _sound: &str, _volume: f32) {}
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    pub struct RecordingAlarm {
        pub rings: RefCell<Vec<(Mode, String, f32)>>,
    }

    impl Alarm for RecordingAlarm {
        fn ring(&self, finished: Mode, sound: &str, volume: f32) {
            self.rings
                .borrow_mut()
                .push((finished, sound.to_string(), volume));
        }
    }
}
