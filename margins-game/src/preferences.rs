//! The one piece of state that survives a reload.
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::convert::Infallible;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub muted: bool,
}

impl Preferences {
    #[must_use]
    pub const fn toggled_mute(self) -> Self {
        Self { muted: !self.muted }
    }
}

/// Platform-provided storage for [`Preferences`].
pub trait PreferenceStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load stored preferences, `None` when nothing was saved yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn load(&self) -> Result<Option<Preferences>, Self::Error>;

    /// Persist preferences.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn save(&self, preferences: &Preferences) -> Result<(), Self::Error>;
}

/// Process-local store; nothing outlives the value.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    stored: Cell<Option<Preferences>>,
}

impl MemoryPreferences {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    type Error = Infallible;

    fn load(&self) -> Result<Option<Preferences>, Infallible> {
        Ok(self.stored.get())
    }

    fn save(&self, preferences: &Preferences) -> Result<(), Infallible> {
        self.stored.set(Some(*preferences));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips() {
        let store = MemoryPreferences::new();
        assert_eq!(store.load().unwrap(), None);
        store.save(&Preferences { muted: true }).unwrap();
        assert_eq!(store.load().unwrap(), Some(Preferences { muted: true }));
    }

    #[test]
    fn missing_field_defaults_to_unmuted() {
        let prefs: Preferences = serde_json::from_str("{}").unwrap();
        assert!(!prefs.muted);
        assert!(prefs.toggled_mute().muted);
    }
}
