use crate::storage::{self, KvStore, StoreError, SETTINGS_KEY};
use pocus_ipc::{Settings, SettingsPatch};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Owns the current settings, persists every change and publishes it to
/// subscribers.
pub struct SettingsStore {
    current: Settings,
    store: Arc<dyn KvStore>,
    tx: watch::Sender<Settings>,
}

impl SettingsStore {
    pub fn load(store: Arc<dyn KvStore>) -> Self {
        let current = sanitize(storage::load_or_default(store.as_ref(), SETTINGS_KEY));
        let (tx, _) = watch::channel(current.clone());
        Self { current, store, tx }
    }

    pub fn get(&self) -> &Settings {
        &self.current
    }

    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }

    pub fn save(&self) -> Result<(), StoreError> {
        storage::save_json(self.store.as_ref(), SETTINGS_KEY, &self.current)
    }

    /// Merges `patch`, persists the result and notifies subscribers. Every
    /// call notifies, even when nothing changed.
    pub fn update(&mut self, patch: &SettingsPatch) -> Result<Settings, StoreError> {
        self.current = sanitize(merge(&self.current, patch));
        info!(settings = ?self.current, "Settings updated");
        self.tx.send_replace(self.current.clone());
        self.save()?;
        Ok(self.current.clone())
    }
}

fn merge(current: &Settings, patch: &SettingsPatch) -> Settings {
    let mut next = current.clone();
    if let Some(v) = patch.work_duration {
        next.work_duration = v;
    }
    if let Some(v) = patch.short_break_duration {
        next.short_break_duration = v;
    }
    if let Some(v) = patch.long_break_duration {
        next.long_break_duration = v;
    }
    if let Some(v) = patch.auto_start_breaks {
        next.auto_start_breaks = v;
    }
    if let Some(v) = patch.auto_start_work {
        next.auto_start_work = v;
    }
    if let Some(v) = patch.long_break_interval {
        next.long_break_interval = v;
    }
    if let Some(v) = &patch.alarm_sound {
        next.alarm_sound = v.clone();
    }
    if let Some(v) = patch.alarm_volume {
        next.alarm_volume = v;
    }
    next
}

/// Durations and the long break interval are at least 1; volume is in [0, 1].
pub fn sanitize(mut settings: Settings) -> Settings {
    settings.work_duration = settings.work_duration.max(1);
    settings.short_break_duration = settings.short_break_duration.max(1);
    settings.long_break_duration = settings.long_break_duration.max(1);
    settings.long_break_interval = settings.long_break_interval.max(1);
    settings.alarm_volume = if settings.alarm_volume.is_nan() {
        Settings::default().alarm_volume
    } else {
        settings.alarm_volume.clamp(0.0, 1.0)
    };
    settings
}
