//! Natural play length of animated assets
//!
//! Only GIF timing is read here: frame delays are summed, with every frame
//! counting at least 100 ms the same way display engines play them. Other
//! clip formats would need a demuxer, so their length stays unknown.

use image::AnimationDecoder;
use image::codecs::gif::GifDecoder;
use std::fs::File;
use std::io::BufReader;
use std::time::Duration;
use tracing::{debug, warn};

use super::{AssetDescriptor, MediaKind};
use crate::constants::timing::MIN_GIF_FRAME_DELAY;

/// Total play length of one pass through `asset`, when it can be known
pub fn natural_length(asset: &AssetDescriptor) -> Option<Duration> {
    if asset.kind != MediaKind::Video {
        return None;
    }
    let is_gif = asset
        .full_path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("gif"));
    if !is_gif {
        debug!(path = %asset.full_path.display(), "No length probe for this clip format");
        return None;
    }

    match gif_length(asset) {
        Ok(length) => {
            debug!(path = %asset.full_path.display(), length_ms = length.as_millis() as u64, "Probed GIF length");
            Some(length)
        }
        Err(e) => {
            warn!(path = %asset.full_path.display(), error = %e, "Failed to read GIF timing");
            None
        }
    }
}

fn gif_length(asset: &AssetDescriptor) -> image::ImageResult<Duration> {
    let file = File::open(&asset.full_path)?;
    let decoder = GifDecoder::new(BufReader::new(file))?;

    let mut total = Duration::ZERO;
    for frame in decoder.into_frames() {
        let (numer, denom) = frame?.delay().numer_denom_ms();
        let delay = Duration::from_millis(u64::from(numer) / u64::from(denom.max(1)));
        total += delay.max(MIN_GIF_FRAME_DELAY);
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifEncoder;
    use image::{Delay, Frame, RgbaImage};
    use std::path::Path;

    fn write_gif(path: &Path, delays_ms: &[u32]) {
        let file = File::create(path).unwrap();
        let mut encoder = GifEncoder::new(file);
        let frames = delays_ms.iter().map(|ms| {
            Frame::from_parts(RgbaImage::new(4, 4), 0, 0, Delay::from_numer_denom_ms(*ms, 1))
        });
        encoder.encode_frames(frames).unwrap();
    }

    #[test]
    fn test_gif_length_sums_frames_with_minimum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.gif");
        write_gif(&path, &[250, 250, 250, 20]);

        let asset = AssetDescriptor { full_path: path, kind: MediaKind::Video };
        // 20 ms frame counts as 100 ms
        assert_eq!(natural_length(&asset), Some(Duration::from_millis(850)));
    }

    #[test]
    fn test_still_images_have_no_length() {
        let asset = AssetDescriptor {
            full_path: "artwork/galaga.png".into(),
            kind: MediaKind::Image,
        };
        assert_eq!(natural_length(&asset), None);
    }

    #[test]
    fn test_corrupt_gif_has_no_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.gif");
        std::fs::write(&path, b"GIF89a-not-really").unwrap();

        let asset = AssetDescriptor { full_path: path, kind: MediaKind::Video };
        assert_eq!(natural_length(&asset), None);
    }
}
