//! Restricted applications and the restriction matcher.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::process::{normalize_executable_name, ProcessInfo};

// ============================================================================
// Restricted App
// ============================================================================

/// An application that must not run during an active focus session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictedApp {
    /// Unique identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Executable name to match against running processes
    pub executable_name: String,

    /// Disabled entries never match
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,

    /// Preset entries ship with the app and can only be disabled
    #[serde(default)]
    pub is_preset: bool,
}

fn default_enabled() -> bool {
    true
}

impl RestrictedApp {
    /// Creates an enabled, user-defined restricted app.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        executable_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            executable_name: executable_name.into(),
            is_enabled: true,
            is_preset: false,
        }
    }

    fn preset(id: &str, name: &str, executable_name: &str) -> Self {
        Self {
            is_preset: true,
            ..Self::new(id, name, executable_name)
        }
    }

    /// Returns the normalized executable name used for matching.
    pub fn match_key(&self) -> String {
        normalize_executable_name(&self.executable_name)
    }

    /// Checks the boundary invariants: non-empty id and executable name.
    pub fn validate(&self) -> DomainResult<()> {
        if self.id.trim().is_empty() {
            return Err(DomainError::invalid("id", &self.id, "a non-empty identifier"));
        }
        if self.match_key().is_empty() {
            return Err(DomainError::invalid(
                "executable_name",
                &self.executable_name,
                "a non-empty executable name",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Matcher
// ============================================================================

/// Returns the running processes that match an enabled restriction.
///
/// Pure and deterministic: the result keeps the scan order of `running`,
/// and a process matching several restrictions is reported once.
pub fn match_restricted(running: &[ProcessInfo], restricted: &[RestrictedApp]) -> Vec<ProcessInfo> {
    let keys: HashSet<String> = restricted
        .iter()
        .filter(|app| app.is_enabled)
        .map(RestrictedApp::match_key)
        .filter(|key| !key.is_empty())
        .collect();

    if keys.is_empty() {
        return Vec::new();
    }

    running
        .iter()
        .filter(|process| keys.contains(&normalize_executable_name(&process.executable_name)))
        .cloned()
        .collect()
}

// ============================================================================
// Restriction List
// ============================================================================

/// In-memory restricted-app list with preset protection and id uniqueness.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictionList {
    apps: Vec<RestrictedApp>,
}

impl RestrictionList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a list seeded with the built-in presets.
    pub fn with_presets() -> Self {
        Self {
            apps: vec![
                RestrictedApp::preset("preset-steam", "Steam", "steam"),
                RestrictedApp::preset("preset-discord", "Discord", "discord"),
                RestrictedApp::preset(
                    "preset-epic",
                    "Epic Games Launcher",
                    "epicgameslauncher",
                ),
                RestrictedApp::preset("preset-battlenet", "Battle.net", "battle.net"),
                RestrictedApp::preset("preset-riot", "Riot Client", "riotclientservices"),
            ],
        }
    }

    /// Returns all entries in insertion order.
    pub fn apps(&self) -> &[RestrictedApp] {
        &self.apps
    }

    /// Returns the enabled entries only.
    pub fn enabled(&self) -> Vec<RestrictedApp> {
        self.apps.iter().filter(|a| a.is_enabled).cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<&RestrictedApp> {
        self.apps.iter().find(|a| a.id == id)
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// Adds an entry.
    ///
    /// # Errors
    /// - `InvalidFieldValue` for an empty id or executable name
    /// - `RestrictionAlreadyExists` if the id is taken
    pub fn add(&mut self, app: RestrictedApp) -> DomainResult<()> {
        app.validate()?;
        if self.get(&app.id).is_some() {
            return Err(DomainError::RestrictionAlreadyExists { id: app.id });
        }
        self.apps.push(app);
        Ok(())
    }

    /// Removes a user-defined entry and returns it.
    ///
    /// # Errors
    /// - `RestrictionNotFound` if no entry has this id
    /// - `PresetNotRemovable` for preset entries
    pub fn remove(&mut self, id: &str) -> DomainResult<RestrictedApp> {
        let index = self
            .apps
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| DomainError::RestrictionNotFound { id: id.to_string() })?;

        if self.apps.get(index).is_some_and(|a| a.is_preset) {
            return Err(DomainError::PresetNotRemovable { id: id.to_string() });
        }

        Ok(self.apps.remove(index))
    }

    /// Flips `is_enabled` and returns the new value.
    pub fn toggle(&mut self, id: &str) -> DomainResult<bool> {
        let app = self
            .apps
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| DomainError::RestrictionNotFound { id: id.to_string() })?;
        app.is_enabled = !app.is_enabled;
        Ok(app.is_enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proc(pid: u32, exe: &str) -> ProcessInfo {
        ProcessInfo::new(pid, exe, exe)
    }

    fn app(id: &str, exe: &str) -> RestrictedApp {
        RestrictedApp::new(id, id, exe)
    }

    #[test]
    fn test_match_returns_enabled_matches_in_scan_order() {
        let running = vec![proc(30, "discord"), proc(10, "bash"), proc(20, "steam")];
        let restricted = vec![app("steam", "steam"), app("discord", "discord")];

        let matched = match_restricted(&running, &restricted);
        let pids: Vec<u32> = matched.iter().map(|p| p.pid).collect();
        assert_eq!(pids, vec![30, 20]);
    }

    #[test]
    fn test_match_is_case_insensitive() {
        let running = vec![ProcessInfo {
            pid: 1,
            display_name: "Steam".into(),
            executable_name: "steam".into(),
        }];
        let restricted = vec![app("steam", "STEAM.exe")];
        assert_eq!(match_restricted(&running, &restricted).len(), 1);
    }

    #[test]
    fn test_match_ignores_disabled_apps() {
        let running = vec![proc(1, "steam")];
        let mut steam = app("steam", "steam");
        steam.is_enabled = false;
        assert!(match_restricted(&running, &[steam]).is_empty());
    }

    #[test]
    fn test_disabling_app_removes_only_its_matches() {
        let running = vec![proc(1, "steam"), proc(2, "discord")];
        let mut restricted = vec![app("steam", "steam"), app("discord", "discord")];
        assert_eq!(match_restricted(&running, &restricted).len(), 2);

        restricted[0].is_enabled = false;
        let matched = match_restricted(&running, &restricted);
        assert_eq!(matched, vec![proc(2, "discord")]);
    }

    #[test]
    fn test_match_reports_process_once_for_duplicate_restrictions() {
        let running = vec![proc(1, "steam")];
        let restricted = vec![app("a", "steam"), app("b", "Steam.exe")];
        assert_eq!(match_restricted(&running, &restricted).len(), 1);
    }

    #[test]
    fn test_match_is_deterministic() {
        let running = vec![proc(3, "steam"), proc(1, "discord"), proc(2, "steam")];
        let restricted = vec![app("discord", "discord"), app("steam", "steam")];
        let first = match_restricted(&running, &restricted);
        let second = match_restricted(&running, &restricted);
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_match_empty_inputs() {
        assert!(match_restricted(&[], &[app("steam", "steam")]).is_empty());
        assert!(match_restricted(&[proc(1, "steam")], &[]).is_empty());
    }

    #[test]
    fn test_match_never_matches_empty_executable_name() {
        let running = vec![ProcessInfo {
            pid: 1,
            display_name: String::new(),
            executable_name: String::new(),
        }];
        let restricted = vec![app("blank", "  ")];
        assert!(match_restricted(&running, &restricted).is_empty());
    }

    #[test]
    fn test_match_requires_exact_name() {
        let running = vec![proc(1, "steamwebhelper"), proc(2, "steam")];
        let matched = match_restricted(&running, &[app("steam", "steam")]);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].pid, 2);
    }

    #[test]
    fn test_list_add_rejects_duplicates_and_empty_names() {
        let mut list = RestrictionList::new();
        list.add(app("game", "game")).unwrap();

        assert_eq!(
            list.add(app("game", "other")),
            Err(DomainError::RestrictionAlreadyExists { id: "game".into() })
        );
        assert!(matches!(
            list.add(app("blank", ".exe")),
            Err(DomainError::InvalidFieldValue { .. })
        ));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_list_remove_refuses_presets() {
        let mut list = RestrictionList::with_presets();
        let before = list.len();
        assert_eq!(
            list.remove("preset-steam"),
            Err(DomainError::PresetNotRemovable {
                id: "preset-steam".into()
            })
        );
        assert_eq!(list.len(), before);
    }

    #[test]
    fn test_list_remove_user_entry() {
        let mut list = RestrictionList::with_presets();
        list.add(app("game", "game")).unwrap();
        let removed = list.remove("game").unwrap();
        assert_eq!(removed.id, "game");
        assert!(list.get("game").is_none());
        assert!(matches!(
            list.remove("game"),
            Err(DomainError::RestrictionNotFound { .. })
        ));
    }

    #[test]
    fn test_list_toggle_flips_enabled() {
        let mut list = RestrictionList::with_presets();
        assert_eq!(list.toggle("preset-discord"), Ok(false));
        assert!(list.enabled().iter().all(|a| a.id != "preset-discord"));
        assert_eq!(list.toggle("preset-discord"), Ok(true));
        assert!(list.toggle("missing").is_err());
    }

    #[test]
    fn test_presets_are_enabled_presets() {
        let list = RestrictionList::with_presets();
        assert!(!list.is_empty());
        assert!(list.apps().iter().all(|a| a.is_preset && a.is_enabled));
    }

    #[test]
    fn test_restricted_app_deserialize_defaults() {
        let app: RestrictedApp = serde_json::from_str(
            r#"{"id":"g","name":"Game","executable_name":"game"}"#,
        )
        .unwrap();
        assert!(app.is_enabled);
        assert!(!app.is_preset);
    }
}
