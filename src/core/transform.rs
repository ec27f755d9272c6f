use rayon::prelude::*;

use crate::error::Result;
use crate::types::{BandBuffer, Tile};

/// Per-tile pixel processing step invoked by the block engine between read
/// and write.
///
/// `apply` sees every band of a tile at once, in band order, so it can
/// combine bands. It may rewrite pixels in place but must keep the band
/// count and each buffer's band index, pixel type and length. It runs inside
/// the engine's worker pool, so rayon parallel iterators fan out there.
pub trait TileTransform: Send + Sync {
    fn apply(&self, tile: &Tile, bands: &mut [BandBuffer]) -> Result<()>;
}

/// Leaves pixels untouched
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl TileTransform for Passthrough {
    fn apply(&self, _tile: &Tile, _bands: &mut [BandBuffer]) -> Result<()> {
        Ok(())
    }
}

/// Runs a single-band step on every band of the tile in parallel
#[derive(Debug, Clone, Copy)]
pub struct PerBand<F>(pub F);

impl<F> TileTransform for PerBand<F>
where
    F: Fn(&Tile, &mut BandBuffer) -> Result<()> + Send + Sync,
{
    fn apply(&self, tile: &Tile, bands: &mut [BandBuffer]) -> Result<()> {
        bands.par_iter_mut().try_for_each(|band| (self.0)(tile, band))
    }
}

impl<F> TileTransform for F
where
    F: Fn(&Tile, &mut [BandBuffer]) -> Result<()> + Send + Sync,
{
    fn apply(&self, tile: &Tile, bands: &mut [BandBuffer]) -> Result<()> {
        self(tile, bands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixelType;

    fn tile() -> Tile {
        Tile {
            x: 0,
            y: 0,
            width: 2,
            height: 2,
        }
    }

    #[test]
    fn per_band_touches_every_band() {
        let tile = tile();
        let mut bands: Vec<BandBuffer> = (1..=3)
            .map(|b| BandBuffer::zeroed(b, PixelType::Byte, &tile))
            .collect();
        let fill = PerBand(|_: &Tile, band: &mut BandBuffer| -> Result<()> {
            band.data.fill(band.band as u8);
            Ok(())
        });
        fill.apply(&tile, &mut bands).unwrap();
        for band in &bands {
            assert!(band.data.iter().all(|&b| b == band.band as u8));
        }
    }

    #[test]
    fn closure_sees_all_bands_together() {
        let tile = tile();
        let mut bands = vec![
            BandBuffer::zeroed(1, PixelType::Byte, &tile),
            BandBuffer::zeroed(2, PixelType::Byte, &tile),
        ];
        bands[0].data.copy_from_slice(&[10, 20, 30, 40]);
        bands[1].data.copy_from_slice(&[1, 2, 3, 4]);
        let difference = |_: &Tile, bands: &mut [BandBuffer]| -> Result<()> {
            let [first, second] = bands else {
                return Ok(());
            };
            for (a, b) in first.data.iter_mut().zip(&second.data) {
                *a -= *b;
            }
            Ok(())
        };
        difference.apply(&tile, &mut bands).unwrap();
        assert_eq!(bands[0].data, [9, 18, 27, 36]);
        assert_eq!(bands[1].data, [1, 2, 3, 4]);
    }
}
