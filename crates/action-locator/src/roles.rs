//! Logical UI roles and the versioned selector map that resolves them.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::LocatorError;

/// Role map schema version understood by this build.
pub const ROLE_MAP_VERSION: u32 = 1;

/// A logical purpose on the meeting page, decoupled from any selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorRole {
    JoinButton,
    MicToggle,
    CameraToggle,
    ParticipantCount,
    ChatButton,
    ChatInput,
    LeaveButton,
}

impl LocatorRole {
    pub const ALL: [LocatorRole; 7] = [
        LocatorRole::JoinButton,
        LocatorRole::MicToggle,
        LocatorRole::CameraToggle,
        LocatorRole::ParticipantCount,
        LocatorRole::ChatButton,
        LocatorRole::ChatInput,
        LocatorRole::LeaveButton,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LocatorRole::JoinButton => "join_button",
            LocatorRole::MicToggle => "mic_toggle",
            LocatorRole::CameraToggle => "camera_toggle",
            LocatorRole::ParticipantCount => "participant_count",
            LocatorRole::ChatButton => "chat_button",
            LocatorRole::ChatInput => "chat_input",
            LocatorRole::LeaveButton => "leave_button",
        }
    }
}

impl fmt::Display for LocatorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Device toggle state encoding on the pre-join screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    pub attribute: String,
    pub muted_value: String,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            attribute: "data-is-muted".to_string(),
            muted_value: "true".to_string(),
        }
    }
}

/// Ordered selector candidates per role, plus the page facts the join flow checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMap {
    pub version: u32,
    /// Free-form tag naming the platform markup revision the selectors target.
    #[serde(default)]
    pub revision: Option<String>,
    pub roles: BTreeMap<LocatorRole, Vec<String>>,
    #[serde(default)]
    pub device_state: DeviceState,
    /// Accepted visible labels of the real join control.
    pub join_labels: Vec<String>,
}

fn list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl RoleMap {
    /// Candidates for the platform markup as last observed.
    pub fn builtin() -> Self {
        let mut roles = BTreeMap::new();
        roles.insert(
            LocatorRole::JoinButton,
            list(&[
                r#"[jsname="Qx7uuf"]"#,
                r#"[jsname="CQylAd"]"#,
                "div.CgwTDb button",
                r#"[role="button"]"#,
                "button",
            ]),
        );
        roles.insert(
            LocatorRole::MicToggle,
            list(&[
                r#"[role="button"][data-is-muted][aria-label*="microphone" i]"#,
                r#"[role="button"][data-is-muted][aria-label*="microfone" i]"#,
                r#"[role="button"][aria-label*="mic" i]"#,
            ]),
        );
        roles.insert(
            LocatorRole::CameraToggle,
            list(&[
                r#"[role="button"][data-is-muted][aria-label*="camera" i]"#,
                r#"[role="button"][data-is-muted][aria-label*="câmera" i]"#,
            ]),
        );
        roles.insert(
            LocatorRole::ParticipantCount,
            list(&[
                "[data-participant-count]",
                r#"[aria-label*="participant" i]"#,
                r#"[aria-label*="participante" i]"#,
            ]),
        );
        roles.insert(
            LocatorRole::ChatButton,
            list(&[
                r#"[role="button"][aria-label*="chat" i]"#,
                r#"[role="button"][aria-label*="mensagem" i]"#,
            ]),
        );
        roles.insert(
            LocatorRole::ChatInput,
            list(&[
                r#"textarea[aria-label*="Send a message" i]"#,
                r#"[aria-label*="Send message" i]"#,
                r#"[aria-label*="Enviar mensagem" i]"#,
                r#"[role="textbox"]"#,
            ]),
        );
        roles.insert(
            LocatorRole::LeaveButton,
            list(&[
                r#"[role="button"][aria-label*="Leave call" i]"#,
                r#"[role="button"][aria-label*="Sair da chamada" i]"#,
                r#"[role="button"][aria-label*="Desligar" i]"#,
            ]),
        );
        Self {
            version: ROLE_MAP_VERSION,
            revision: Some("meet-2024".to_string()),
            roles,
            device_state: DeviceState::default(),
            join_labels: list(&["Join now", "Participar agora"]),
        }
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, LocatorError> {
        let map: RoleMap = serde_yaml::from_str(raw)
            .map_err(|err| LocatorError::InvalidRoleMap(err.to_string()))?;
        map.validate()?;
        Ok(map)
    }

    pub fn load(path: &Path) -> Result<Self, LocatorError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| LocatorError::Io(format!("{}: {err}", path.display())))?;
        Self::from_yaml_str(&raw)
    }

    pub fn to_yaml(&self) -> Result<String, LocatorError> {
        serde_yaml::to_string(self).map_err(|err| LocatorError::InvalidRoleMap(err.to_string()))
    }

    /// Every role needs at least one non-blank candidate, and the join flow needs labels.
    pub fn validate(&self) -> Result<(), LocatorError> {
        if self.version != ROLE_MAP_VERSION {
            return Err(LocatorError::UnsupportedVersion {
                found: self.version,
                expected: ROLE_MAP_VERSION,
            });
        }
        let missing: Vec<&str> = LocatorRole::ALL
            .iter()
            .filter(|role| {
                self.roles
                    .get(role)
                    .map(|candidates| candidates.iter().all(|c| c.trim().is_empty()))
                    .unwrap_or(true)
            })
            .map(|role| role.name())
            .collect();
        if !missing.is_empty() {
            return Err(LocatorError::InvalidRoleMap(format!(
                "no selectors for: {}",
                missing.join(", ")
            )));
        }
        if self.join_labels.iter().all(|label| label.trim().is_empty()) {
            return Err(LocatorError::InvalidRoleMap(
                "join_labels must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn candidates(&self, role: LocatorRole) -> &[String] {
        self.roles.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `text` carries one of the accepted join labels (case-insensitive).
    pub fn is_join_label(&self, text: &str) -> bool {
        let haystack = text.to_lowercase();
        self.join_labels
            .iter()
            .filter(|label| !label.trim().is_empty())
            .any(|label| haystack.contains(&label.to_lowercase()))
    }
}

impl Default for RoleMap {
    fn default() -> Self {
        Self::builtin()
    }
}
