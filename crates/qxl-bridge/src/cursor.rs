//! Cursor commands and the producer-side change tracker.

use std::fmt;
use std::sync::Arc;

use qxl_queue::{ReleaseInfo, ReleaseToken, Retire};

use crate::error::{BridgeError, Result};

pub const CURSOR_WIDTH: u16 = 32;
pub const CURSOR_HEIGHT: u16 = 32;

/// Extra bytes some clients expect past the pixel data of a cursor shape.
pub const CURSOR_DATA_SLACK: u32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A 32bpp ARGB cursor image (`SPICE_CURSOR_TYPE_COLOR32`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorShape {
    pub width: u16,
    pub height: u16,
    pub hot_spot_x: u16,
    pub hot_spot_y: u16,
    /// Size advertised to the worker; pixel bytes plus [`CURSOR_DATA_SLACK`].
    pub data_size: u32,
    pub data: Arc<[u8]>,
}

const WHITE_SQUARE_LEN: u32 = CURSOR_WIDTH as u32 * CURSOR_HEIGHT as u32 * 4;

impl CursorShape {
    /// Shape from `width * height` ARGB pixels.
    ///
    /// Rejects shapes whose advertised size would not fit the worker's 32-bit `data_size`, and
    /// pixel data whose length does not match the dimensions.
    pub fn color32(width: u16, height: u16, data: impl Into<Arc<[u8]>>) -> Result<Self> {
        let expected = u64::from(width) * u64::from(height) * 4;
        let data_size = u32::try_from(expected)
            .ok()
            .and_then(|len| len.checked_add(CURSOR_DATA_SLACK))
            .ok_or(BridgeError::CursorTooLarge { width, height })?;
        let data = data.into();
        if u64::try_from(data.len()).ok() != Some(expected) {
            return Err(BridgeError::CursorDataLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            hot_spot_x: 0,
            hot_spot_y: 0,
            data_size,
            data,
        })
    }

    /// Opaque white 32x32 square.
    pub fn white_square() -> Self {
        Self {
            width: CURSOR_WIDTH,
            height: CURSOR_HEIGHT,
            hot_spot_x: 0,
            hot_spot_y: 0,
            data_size: WHITE_SQUARE_LEN + CURSOR_DATA_SLACK,
            data: vec![0xff; WHITE_SQUARE_LEN as usize].into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorKind {
    Set {
        shape: CursorShape,
        position: Point,
        visible: bool,
    },
    Move {
        position: Point,
    },
    Hide,
}

/// Cursor update record; coalesced in the cursor slot rather than queued.
pub struct CursorCommand {
    kind: CursorKind,
    token: ReleaseToken,
}

impl CursorCommand {
    pub fn new(kind: CursorKind, token: ReleaseToken) -> Self {
        Self { kind, token }
    }

    pub fn kind(&self) -> &CursorKind {
        &self.kind
    }

    pub fn release_info(&self) -> ReleaseInfo {
        self.token.info()
    }

    pub fn ext(&self) -> CursorCommandExt {
        CursorCommandExt {
            kind: self.kind.clone(),
            release_info: self.release_info(),
        }
    }
}

impl Retire for CursorCommand {
    fn retire(self) {
        self.token.release();
    }
}

impl fmt::Debug for CursorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorCommand")
            .field("kind", &self.kind)
            .field("release", &self.token)
            .finish()
    }
}

/// Worker-side view of a pulled cursor command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorCommandExt {
    pub kind: CursorKind,
    pub release_info: ReleaseInfo,
}

/// Decides which cursor update (if any) a pointer position warrants.
///
/// The first update sets the shape; afterwards only actual movement produces a `Move`.
#[derive(Debug, Default)]
pub struct CursorTracker {
    last: Option<Point>,
}

impl CursorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, position: Point) -> Option<CursorKind> {
        match self.last.replace(position) {
            None => Some(CursorKind::Set {
                shape: CursorShape::white_square(),
                position,
                visible: true,
            }),
            Some(prev) if prev == position => None,
            Some(_) => Some(CursorKind::Move { position }),
        }
    }

    /// Forget the last position so the next update re-sends the shape.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn white_square_reports_slack_in_data_size() {
        let shape = CursorShape::white_square();
        assert_eq!((shape.width, shape.height), (32, 32));
        assert_eq!(shape.data.len(), 32 * 32 * 4);
        assert_eq!(shape.data_size, 32 * 32 * 4 + 128);
        assert!(shape.data.iter().all(|&b| b == 0xff));
        assert_eq!(
            CursorShape::color32(32, 32, vec![0xffu8; 32 * 32 * 4]).unwrap(),
            shape
        );
    }

    #[test]
    fn color32_rejects_data_that_does_not_match_dimensions() {
        let err = CursorShape::color32(2, 2, vec![0u8; 15]).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::CursorDataLength {
                expected: 16,
                actual: 15
            }
        ));
    }

    #[test]
    fn color32_rejects_shapes_whose_size_overflows_u32() {
        let err = CursorShape::color32(u16::MAX, u16::MAX, Vec::<u8>::new()).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::CursorTooLarge {
                width: u16::MAX,
                height: u16::MAX
            }
        ));
    }

    #[test]
    fn tracker_sets_shape_then_moves_only_on_change() {
        let mut tracker = CursorTracker::new();

        match tracker.update(Point::new(3, 4)) {
            Some(CursorKind::Set {
                position, visible, ..
            }) => {
                assert_eq!(position, Point::new(3, 4));
                assert!(visible);
            }
            other => panic!("expected Set, got {other:?}"),
        }

        assert_eq!(tracker.update(Point::new(3, 4)), None);
        assert_eq!(
            tracker.update(Point::new(5, 4)),
            Some(CursorKind::Move {
                position: Point::new(5, 4)
            })
        );

        tracker.reset();
        assert!(matches!(
            tracker.update(Point::new(5, 4)),
            Some(CursorKind::Set { .. })
        ));
    }
}
