use anyhow::{Context, Result};
use directories::ProjectDirs;
use pocus_ipc::Mode;
use ratatui::style::Color;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub theme: Theme,
    pub icons: Icons,
    /// Where the settings and task records live.
    pub data_dir: Option<PathBuf>,
    pub socket: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Theme {
    #[serde(deserialize_with = "hex_to_color")]
    pub background: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub foreground: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub selection: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub black: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub gray: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub green: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub yellow: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub magenta: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub work: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub short_break: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub long_break: Color,
}

impl Theme {
    pub fn mode_color(&self, mode: Mode) -> Color {
        match mode {
            Mode::Work => self.work,
            Mode::ShortBreak => self.short_break,
            Mode::LongBreak => self.long_break,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Icons {
    pub play: String,
    pub pause: String,
    pub pending: String,
    pub done: String,
    pub select: String,
    pub selected_task: String,
    pub input_cursor: String,
    pub separator: String,
    pub header_left: String,
    pub header_right: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            background: Color::Rgb(9, 14, 19),
            foreground: Color::Rgb(197, 201, 199),
            selection: Color::Rgb(230, 195, 132),
            black: Color::Rgb(13, 12, 12),
            gray: Color::Rgb(164, 167, 164),
            green: Color::Rgb(138, 154, 123),
            yellow: Color::Rgb(196, 178, 138),
            magenta: Color::Rgb(162, 146, 163),
            work: Color::Rgb(199, 83, 81),
            short_break: Color::Rgb(76, 145, 149),
            long_break: Color::Rgb(69, 124, 164),
        }
    }
}

impl Default for Icons {
    fn default() -> Self {
        Self {
            play: "▶".to_string(),
            pause: "⏸".to_string(),
            pending: "☐".to_string(),
            done: "☑".to_string(),
            select: "▸".to_string(),
            selected_task: "●".to_string(),
            input_cursor: "▊".to_string(),
            separator: "│".to_string(),
            header_left: "⟪ ".to_string(),
            header_right: " ⟫".to_string(),
        }
    }
}

fn hex_to_color<'de, D>(deserializer: D) -> Result<Color, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = serde::Deserialize::deserialize(deserializer)?;
    if !s.starts_with('#') || s.len() != 7 {
        return Err(serde::de::Error::custom("invalid hex color format"));
    }
    let r = u8::from_str_radix(&s[1..3], 16).map_err(serde::de::Error::custom)?;
    let g = u8::from_str_radix(&s[3..5], 16).map_err(serde::de::Error::custom)?;
    let b = u8::from_str_radix(&s[5..7], 16).map_err(serde::de::Error::custom)?;
    Ok(Color::Rgb(r, g, b))
}

pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "pocus", "pocus").map(|dirs| dirs.config_dir().join("pocus.toml"))
}

/// Reads `path`, or the default location when `None`. A missing file
/// yields the defaults; a broken one is an error.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path.map(Path::to_path_buf).or_else(default_config_path) {
        Some(path) => path,
        None => return Ok(Config::default()),
    };
    if !path.exists() {
        return Ok(Config::default());
    }
    let config_str = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file at {:?}", path))?;
    toml::from_str(&config_str).with_context(|| format!("Failed to parse config file at {:?}", path))
}
