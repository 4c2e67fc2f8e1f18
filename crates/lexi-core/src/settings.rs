use serde::{Deserialize, Serialize};

pub const THEMES: &[&str] = &[
    "light",
    "dark",
    "amoled-black",
    "slate-blue",
    "forest-green",
    "sunset-orange",
    "crimson-night",
    "ocean-breeze",
    "royal-purple",
    "cyberpunk-glow",
    "pastel-dream",
    "coffee-house",
    "monochrome-light",
    "monochrome-dark",
    "minty-fresh",
    "rose-quartz",
    "deep-indigo",
    "volcanic-ash",
    "arctic-blue",
    "golden-hour",
];

pub const DEFAULT_THEME: &str = "dark";

pub fn is_known_theme(theme: &str) -> bool {
    THEMES.contains(&theme)
}

/// Per-workspace editor preferences, exported with `.aitxt` files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorSettings {
    pub theme: String,
    pub background_image_url: String,
    pub assistant_voice_enabled: bool,
    pub background_music_url: String,
    pub is_music_playing: bool,
    pub is_assistant_panel_visible: bool,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            theme: DEFAULT_THEME.to_string(),
            background_image_url: "https://picsum.photos/seed/lexi-editor/1920/1080".to_string(),
            assistant_voice_enabled: true,
            background_music_url: String::new(),
            is_music_playing: false,
            is_assistant_panel_visible: true,
        }
    }
}

impl EditorSettings {
    /// Overlays the fields present in `patch`; an unknown theme falls back
    /// to the default one.
    pub fn merge(&mut self, patch: &EditorSettingsPatch) {
        if let Some(theme) = &patch.theme {
            self.theme = theme.clone();
        }
        if let Some(url) = &patch.background_image_url {
            self.background_image_url = url.clone();
        }
        if let Some(enabled) = patch.assistant_voice_enabled {
            self.assistant_voice_enabled = enabled;
        }
        if let Some(url) = &patch.background_music_url {
            self.background_music_url = url.clone();
        }
        if let Some(playing) = patch.is_music_playing {
            self.is_music_playing = playing;
        }
        if let Some(visible) = patch.is_assistant_panel_visible {
            self.is_assistant_panel_visible = visible;
        }
        if !is_known_theme(&self.theme) {
            self.theme = DEFAULT_THEME.to_string();
        }
    }

    pub fn toggle_voice(&mut self) -> bool {
        self.assistant_voice_enabled = !self.assistant_voice_enabled;
        self.assistant_voice_enabled
    }

    pub fn toggle_music(&mut self) -> bool {
        self.is_music_playing = !self.is_music_playing;
        self.is_music_playing
    }

    pub fn toggle_assistant_panel(&mut self) -> bool {
        self.is_assistant_panel_visible = !self.is_assistant_panel_visible;
        self.is_assistant_panel_visible
    }
}

/// Settings as read from a file: any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorSettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_voice_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_music_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_music_playing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_assistant_panel_visible: Option<bool>,
}

impl From<&EditorSettings> for EditorSettingsPatch {
    fn from(s: &EditorSettings) -> Self {
        Self {
            theme: Some(s.theme.clone()),
            background_image_url: Some(s.background_image_url.clone()),
            assistant_voice_enabled: Some(s.assistant_voice_enabled),
            background_music_url: Some(s.background_music_url.clone()),
            is_music_playing: Some(s.is_music_playing),
            is_assistant_panel_visible: Some(s.is_assistant_panel_visible),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_missing_fields() {
        let mut settings = EditorSettings {
            is_music_playing: true,
            ..EditorSettings::default()
        };
        settings.merge(&EditorSettingsPatch {
            theme: Some("forest-green".into()),
            ..Default::default()
        });
        assert_eq!(settings.theme, "forest-green");
        assert!(settings.is_music_playing);
    }

    #[test]
    fn test_unknown_theme_falls_back() {
        let mut settings = EditorSettings::default();
        settings.merge(&EditorSettingsPatch {
            theme: Some("neon-unicorn".into()),
            ..Default::default()
        });
        assert_eq!(settings.theme, DEFAULT_THEME);
    }

    #[test]
    fn test_toggles() {
        let mut settings = EditorSettings::default();
        assert!(!settings.toggle_voice());
        assert!(settings.toggle_music());
        assert!(!settings.toggle_assistant_panel());
    }
}
