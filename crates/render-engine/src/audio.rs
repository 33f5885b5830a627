//! Narration and background music mixing.

use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;
use reelsmith_project_model::{BgmMode, BgmSettings};

/// Label of the mixed audio stream in the encode graph.
pub const AUDIO_OUTPUT_LABEL: &str = "[aout]";

/// Background music ready to mix.
#[derive(Debug, Clone, PartialEq)]
pub struct BgmTrack {
    pub path: PathBuf,
    pub volume: f64,

    /// Fade-out at the end of the video, in seconds.
    pub fade_out: f64,
}

/// The audio attached by the final encode.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioMix {
    pub narration: PathBuf,
    pub narration_volume: f64,
    pub bgm: Option<BgmTrack>,
}

impl AudioMix {
    /// Filtergraph producing [`AUDIO_OUTPUT_LABEL`] of exactly `duration` seconds.
    ///
    /// `narration_input` and `bgm_input` are ffmpeg input indices; the BGM
    /// input is expected to be opened with `-stream_loop -1`.
    pub fn filter_graph(&self, duration: f64, narration_input: usize, bgm_input: usize) -> String {
        let narration = format!(
            "[{narration_input}:a]volume={:.3},atrim=0:{duration:.3},asetpts=PTS-STARTPTS",
            self.narration_volume
        );

        match &self.bgm {
            None => format!("{narration}{AUDIO_OUTPUT_LABEL}"),
            Some(bgm) => {
                let fade = bgm.fade_out.min(duration).max(0.0);
                format!(
                    "{narration}[narr];\
                     [{bgm_input}:a]volume={:.3},atrim=0:{duration:.3},asetpts=PTS-STARTPTS,\
                     afade=t=out:st={:.3}:d={fade:.3}[bgm];\
                     [narr][bgm]amix=inputs=2:duration=first:dropout_transition=0:normalize=0{AUDIO_OUTPUT_LABEL}",
                    bgm.volume,
                    duration - fade,
                )
            }
        }
    }
}

/// Pick the background music file for a job.
///
/// An explicit file wins whenever it exists. Otherwise `random` mode picks a
/// `*.mp3` from `bgm_dir`. Returns `None` when BGM is off or nothing fits.
pub fn resolve_bgm<R: Rng + ?Sized>(
    settings: &BgmSettings,
    bgm_dir: Option<&Path>,
    rng: &mut R,
) -> Option<PathBuf> {
    if settings.mode == BgmMode::None {
        return None;
    }

    if let Some(file) = settings.file.as_ref() {
        if file.is_file() {
            return Some(file.clone());
        }
        tracing::warn!(path = %file.display(), "Background music file not found");
    }

    if settings.mode != BgmMode::Random {
        return None;
    }

    let Some(dir) = bgm_dir else {
        tracing::warn!("Random background music requested but no music directory is configured");
        return None;
    };

    let mut candidates = list_mp3_files(dir);
    candidates.sort();
    let picked = candidates.choose(rng).cloned();
    if picked.is_none() {
        tracing::warn!(dir = %dir.display(), "No mp3 files in music directory");
    }
    picked
}

fn list_mp3_files(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Cannot read music directory");
            return Vec::new();
        }
    };

    entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("mp3"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn settings(mode: BgmMode, file: Option<PathBuf>) -> BgmSettings {
        BgmSettings {
            mode,
            file,
            volume: 0.2,
        }
    }

    #[test]
    fn test_narration_only_graph() {
        let mix = AudioMix {
            narration: PathBuf::from("voice.mp3"),
            narration_volume: 1.0,
            bgm: None,
        };
        assert_eq!(
            mix.filter_graph(12.0, 1, 2),
            "[1:a]volume=1.000,atrim=0:12.000,asetpts=PTS-STARTPTS[aout]"
        );
    }

    #[test]
    fn test_bgm_graph_fades_at_end() {
        let mix = AudioMix {
            narration: PathBuf::from("voice.mp3"),
            narration_volume: 1.0,
            bgm: Some(BgmTrack {
                path: PathBuf::from("music.mp3"),
                volume: 0.2,
                fade_out: 3.0,
            }),
        };
        let graph = mix.filter_graph(20.0, 1, 2);
        assert!(graph.contains("[2:a]volume=0.200,atrim=0:20.000"));
        assert!(graph.contains("afade=t=out:st=17.000:d=3.000[bgm]"));
        assert!(graph.ends_with("amix=inputs=2:duration=first:dropout_transition=0:normalize=0[aout]"));
    }

    #[test]
    fn test_resolve_prefers_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("chosen.mp3");
        std::fs::write(&file, b"id3").unwrap();
        std::fs::write(dir.path().join("other.mp3"), b"id3").unwrap();

        let mut rng = StdRng::seed_from_u64(1);
        let picked = resolve_bgm(
            &settings(BgmMode::Random, Some(file.clone())),
            Some(dir.path()),
            &mut rng,
        );
        assert_eq!(picked, Some(file));
    }

    #[test]
    fn test_resolve_random_picks_mp3_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.MP3"), b"id3").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let mut rng = StdRng::seed_from_u64(1);
        let picked = resolve_bgm(&settings(BgmMode::Random, None), Some(dir.path()), &mut rng);
        assert_eq!(picked, Some(dir.path().join("a.MP3")));
    }

    #[test]
    fn test_resolve_disabled_or_missing() {
        let mut rng = StdRng::seed_from_u64(1);
        let missing = Some(PathBuf::from("/nonexistent/song.mp3"));
        assert_eq!(resolve_bgm(&settings(BgmMode::None, missing.clone()), None, &mut rng), None);
        assert_eq!(resolve_bgm(&settings(BgmMode::File, missing), None, &mut rng), None);
        assert_eq!(resolve_bgm(&settings(BgmMode::Random, None), None, &mut rng), None);
    }
}
