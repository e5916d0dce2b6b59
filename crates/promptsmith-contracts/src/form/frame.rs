use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSettings {
    pub ratio: String,
    pub resolution: String,
    pub usage: String,
}

impl FrameSettings {
    pub fn new(
        ratio: impl Into<String>,
        resolution: impl Into<String>,
        usage: impl Into<String>,
    ) -> Self {
        Self {
            ratio: ratio.into(),
            resolution: resolution.into(),
            usage: usage.into(),
        }
    }

    pub fn from_preset(preset: &FramePreset) -> Self {
        Self::new(preset.ratio, preset.resolution, preset.usage)
    }

    pub fn is_empty(&self) -> bool {
        self.ratio.is_empty() && self.resolution.is_empty() && self.usage.is_empty()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FramePreset {
    pub name: &'static str,
    pub ratio: &'static str,
    pub resolution: &'static str,
    pub usage: &'static str,
}

pub const FRAME_PRESETS: &[FramePreset] = &[
    FramePreset {
        name: "phone",
        ratio: "9:16",
        resolution: "2048×3640 (2K)",
        usage: "Phone wallpaper",
    },
    FramePreset {
        name: "desktop",
        ratio: "16:9",
        resolution: "3840×2160 (4K)",
        usage: "Desktop wallpaper",
    },
    FramePreset {
        name: "tablet",
        ratio: "4:3",
        resolution: "2732×2048 (iPad)",
        usage: "Tablet wallpaper",
    },
    FramePreset {
        name: "avatar",
        ratio: "1:1",
        resolution: "1024×1024",
        usage: "Social avatar",
    },
];

pub const RATIO_OPTIONS: &[&str] = &["9:16", "16:9", "4:3", "3:4", "1:1", "2:3", "3:2", "21:9"];

pub const RESOLUTION_OPTIONS: &[&str] = &[
    "1024×1024",
    "1920×1080 (1080P)",
    "2048×3640 (2K portrait)",
    "3640×2048 (2K landscape)",
    "2560×1440 (2K)",
    "3840×2160 (4K)",
    "2732×2048 (iPad)",
    "2400×3600",
    "3600×2400",
    "3440×1440",
    "4096×4096",
];

pub const USAGE_OPTIONS: &[&str] = &[
    "Phone wallpaper",
    "Desktop wallpaper",
    "Tablet wallpaper",
    "Social avatar",
    "Ultrawide wallpaper",
];

pub fn frame_preset(name: &str) -> Option<&'static FramePreset> {
    let wanted = name.trim().to_ascii_lowercase();
    FRAME_PRESETS.iter().find(|preset| preset.name == wanted)
}

/// The quick preset whose three values exactly equal `settings`, if any.
pub fn matching_preset(settings: &FrameSettings) -> Option<&'static FramePreset> {
    FRAME_PRESETS.iter().find(|preset| {
        preset.ratio == settings.ratio
            && preset.resolution == settings.resolution
            && preset.usage == settings.usage
    })
}
