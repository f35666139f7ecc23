use serde::{Deserialize, Serialize};

/// Named stream quality preset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamQuality {
    Low,
    #[default]
    Medium,
    High,
}

impl StreamQuality {
    /// Resolve a quality name, falling back to `Medium` for anything
    /// unrecognized (including an empty or missing name).
    pub fn from_name(name: &str) -> Self {
        match name {
            "low" => StreamQuality::Low,
            "high" => StreamQuality::High,
            _ => StreamQuality::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamQuality::Low => "low",
            StreamQuality::Medium => "medium",
            StreamQuality::High => "high",
        }
    }

    /// Encoder settings for this preset
    pub fn profile(&self) -> QualityProfile {
        match self {
            StreamQuality::Low => QualityProfile {
                width: 640,
                height: 480,
                framerate: 15,
                bitrate: 1_000_000,
            },
            StreamQuality::Medium => QualityProfile {
                width: 1280,
                height: 720,
                framerate: 30,
                bitrate: 2_000_000,
            },
            StreamQuality::High => QualityProfile {
                width: 1920,
                height: 1080,
                framerate: 30,
                bitrate: 4_000_000,
            },
        }
    }
}

impl std::fmt::Display for StreamQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fixed encoder settings behind a quality name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityProfile {
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    /// Target bitrate in bits per second
    pub bitrate: u32,
}

/// External capture command and its argument mapping
///
/// The primary and fallback commands take equivalent settings under
/// different flag names. `Custom` bypasses the profile mapping entirely
/// and is meant for containers and dev hosts without a Pi camera stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaptureCommand {
    LibcameraVid,
    Raspivid,
    Custom { program: String, args: Vec<String> },
}

impl CaptureCommand {
    /// Program name to spawn
    pub fn program(&self) -> &str {
        match self {
            CaptureCommand::LibcameraVid => "libcamera-vid",
            CaptureCommand::Raspivid => "raspivid",
            CaptureCommand::Custom { program, .. } => program,
        }
    }

    /// Argument list for the given profile
    ///
    /// Both Pi commands write a continuous H.264 byte stream to stdout
    /// and stop cleanly on SIGTERM.
    pub fn build_args(&self, profile: &QualityProfile) -> Vec<String> {
        match self {
            CaptureCommand::LibcameraVid => vec![
                "--nopreview".to_string(),
                "--timeout".to_string(),
                "0".to_string(),
                "--width".to_string(),
                profile.width.to_string(),
                "--height".to_string(),
                profile.height.to_string(),
                "--framerate".to_string(),
                profile.framerate.to_string(),
                "--bitrate".to_string(),
                profile.bitrate.to_string(),
                "--output".to_string(),
                "-".to_string(),
                "--codec".to_string(),
                "h264".to_string(),
                "--inline".to_string(),
                "--listen".to_string(),
            ],
            CaptureCommand::Raspivid => vec![
                "-t".to_string(),
                "0".to_string(),
                "-w".to_string(),
                profile.width.to_string(),
                "-h".to_string(),
                profile.height.to_string(),
                "-fps".to_string(),
                profile.framerate.to_string(),
                "-b".to_string(),
                profile.bitrate.to_string(),
                "-o".to_string(),
                "-".to_string(),
                "-pf".to_string(),
                "baseline".to_string(),
            ],
            CaptureCommand::Custom { args, .. } => args.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_names_resolve() {
        assert_eq!(StreamQuality::from_name("low"), StreamQuality::Low);
        assert_eq!(StreamQuality::from_name("medium"), StreamQuality::Medium);
        assert_eq!(StreamQuality::from_name("high"), StreamQuality::High);
    }

    #[test]
    fn test_unknown_names_fall_back_to_medium() {
        for name in ["", "ultra", "4k", "LOW", "Medium "] {
            assert_eq!(StreamQuality::from_name(name), StreamQuality::Medium);
        }
    }

    #[test]
    fn test_profile_values() {
        let low = StreamQuality::Low.profile();
        assert_eq!((low.width, low.height, low.framerate), (640, 480, 15));
        assert_eq!(low.bitrate, 1_000_000);

        let high = StreamQuality::High.profile();
        assert_eq!((high.width, high.height), (1920, 1080));
        assert_eq!(high.bitrate, 4_000_000);
    }

    #[test]
    fn test_libcamera_args_carry_profile() {
        let args = CaptureCommand::LibcameraVid.build_args(&StreamQuality::Medium.profile());
        let pos = args.iter().position(|a| a == "--width").unwrap();
        assert_eq!(args[pos + 1], "1280");
        assert!(args.contains(&"--inline".to_string()));
        assert!(args.contains(&"h264".to_string()));
    }

    #[test]
    fn test_raspivid_args_use_short_flags() {
        let args = CaptureCommand::Raspivid.build_args(&StreamQuality::Low.profile());
        let pos = args.iter().position(|a| a == "-w").unwrap();
        assert_eq!(args[pos + 1], "640");
        assert!(args.contains(&"baseline".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--")));
    }

    #[test]
    fn test_custom_command_ignores_profile() {
        let cmd = CaptureCommand::Custom {
            program: "ffmpeg".to_string(),
            args: vec!["-i".to_string(), "/dev/video0".to_string()],
        };
        let low = cmd.build_args(&StreamQuality::Low.profile());
        let high = cmd.build_args(&StreamQuality::High.profile());
        assert_eq!(low, high);
    }

    #[test]
    fn test_quality_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&StreamQuality::High).unwrap(),
            "\"high\""
        );
        let q: StreamQuality = serde_json::from_str("\"low\"").unwrap();
        assert_eq!(q, StreamQuality::Low);
    }
}
