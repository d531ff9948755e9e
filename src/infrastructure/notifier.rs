use log::debug;

/// Completion cue boundary. Both calls are best-effort: permission may be
/// denied or playback blocked, and neither outcome may fail or delay the
/// timer transition that triggered the cue.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);

    fn play_sound(&self, sound_id: &str, volume_percent: u8);
}

/// Default notifier for headless use; records the cue in the log and nothing
/// else. Desktop frontends supply their own implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        debug!("notification: {title} - {body}");
    }

    fn play_sound(&self, sound_id: &str, volume_percent: u8) {
        debug!("sound cue: {sound_id} at {volume_percent}%");
    }
}
