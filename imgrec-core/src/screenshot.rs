//! Screen frame acquisition.
//!
//! [`FrameSource`] is the component automation code talks to.  It owns a
//! [`FrameProvider`], the raw pixel-grabbing primitive, which is injected at
//! construction so tests can substitute [`MemoryFrameProvider`] for the
//! native GDI implementation.
//!
//! # GDI capture overview (Windows)
//!
//! 1. `GetDC(NULL)` for the whole virtual desktop.
//! 2. `CreateCompatibleDC` + `CreateCompatibleBitmap` sized to the region.
//! 3. `SelectObject` the bitmap into the memory DC and `BitBlt` the region.
//! 4. `GetDIBits` as a top-down 32-bit DIB, then drop alpha to get RGB.
//!
//! Every handle acquired in steps 1-3 is held by an RAII guard, so it is
//! released on every exit path, including a failure halfway through.
//!
//! # Examples
//!
//! ```
//! use imgrec_core::frame::{Frame, Region};
//! use imgrec_core::screenshot::{FrameSource, MemoryFrameProvider};
//!
//! let screen = Frame::new(4, 2, vec![0u8; 4 * 2 * 3]).unwrap();
//! let source = FrameSource::new(MemoryFrameProvider::new(screen));
//! let frame = source.capture(Some(Region::new(1, 0, 2, 2))).expect("capture failed");
//! assert_eq!((frame.width(), frame.height()), (2, 2));
//! ```

use crate::errors::{AutomationError, Result};
use crate::frame::{Frame, Region};

// ---------------------------------------------------------------------------
// Provider trait
// ---------------------------------------------------------------------------

/// Raw capture primitive.
pub trait FrameProvider {
    /// Bounds of the full virtual screen.
    fn screen_bounds(&self) -> Result<Region>;

    /// Copy the pixels of `region` (screen coordinates, non-empty) into a
    /// freshly owned frame.
    fn grab(&self, region: Region) -> Result<Frame>;
}

impl<P: FrameProvider + ?Sized> FrameProvider for Box<P> {
    fn screen_bounds(&self) -> Result<Region> {
        (**self).screen_bounds()
    }

    fn grab(&self, region: Region) -> Result<Frame> {
        (**self).grab(region)
    }
}

// ---------------------------------------------------------------------------
// FrameSource
// ---------------------------------------------------------------------------

/// Captures frames through an injected [`FrameProvider`].
pub struct FrameSource<P> {
    provider: P,
}

impl<P: FrameProvider> FrameSource<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Capture `region`, or the full virtual screen when `None`.
    ///
    /// The returned frame is always a fresh copy owned by the caller and has
    /// exactly the region's dimensions.
    ///
    /// # Errors
    ///
    /// [`AutomationError::CaptureError`] for a zero-sized region or when the
    /// display cannot be acquired.
    pub fn capture(&self, region: Option<Region>) -> Result<Frame> {
        let region = match region {
            Some(r) => r,
            None => self.provider.screen_bounds()?,
        };
        if region.is_empty() {
            return Err(AutomationError::CaptureError(format!(
                "cannot capture zero-sized region {}x{}",
                region.width, region.height
            )));
        }

        let frame = self.provider.grab(region)?;
        if frame.width() != region.width || frame.height() != region.height {
            return Err(AutomationError::CaptureError(format!(
                "provider returned {}x{} for a {}x{} region",
                frame.width(),
                frame.height(),
                region.width,
                region.height
            )));
        }
        log::debug!(
            "captured {}x{} at ({},{})",
            region.width,
            region.height,
            region.x,
            region.y
        );
        Ok(frame)
    }
}

#[cfg(windows)]
impl FrameSource<GdiFrameProvider> {
    /// Frame source backed by the live desktop.
    pub fn native() -> Self {
        Self::new(GdiFrameProvider)
    }
}

// ---------------------------------------------------------------------------
// In-memory provider
// ---------------------------------------------------------------------------

/// Serves regions of a fixed image as if it were the screen.
///
/// The screen origin is (0, 0) and its size is the image size.
#[derive(Debug, Clone)]
pub struct MemoryFrameProvider {
    screen: Frame,
}

impl MemoryFrameProvider {
    pub fn new(screen: Frame) -> Self {
        Self { screen }
    }

    pub fn screen(&self) -> &Frame {
        &self.screen
    }
}

impl FrameProvider for MemoryFrameProvider {
    fn screen_bounds(&self) -> Result<Region> {
        Ok(Region::new(0, 0, self.screen.width(), self.screen.height()))
    }

    fn grab(&self, region: Region) -> Result<Frame> {
        self.screen.crop(&region)
    }
}

// ---------------------------------------------------------------------------
// GDI provider
// ---------------------------------------------------------------------------

#[cfg(windows)]
pub use gdi::GdiFrameProvider;

#[cfg(windows)]
mod gdi {
    use windows::Win32::Foundation::HWND;
    use windows::Win32::Graphics::Gdi::{
        BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC,
        GetDIBits, ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB,
        DIB_RGB_COLORS, HBITMAP, HDC, HGDIOBJ, SRCCOPY,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        GetSystemMetrics, SM_CXVIRTUALSCREEN, SM_CYVIRTUALSCREEN, SM_XVIRTUALSCREEN,
        SM_YVIRTUALSCREEN,
    };

    use super::FrameProvider;
    use crate::errors::{AutomationError, Result};
    use crate::frame::{Frame, Region};

    /// Desktop DC from `GetDC(NULL)`, released on drop.
    struct ScreenDc(HDC);

    impl ScreenDc {
        fn acquire() -> Result<Self> {
            let dc = unsafe { GetDC(HWND(std::ptr::null_mut())) };
            if dc.is_invalid() {
                return Err(AutomationError::CaptureError("GetDC(NULL) failed".into()));
            }
            Ok(Self(dc))
        }
    }

    impl Drop for ScreenDc {
        fn drop(&mut self) {
            unsafe { ReleaseDC(HWND(std::ptr::null_mut()), self.0) };
        }
    }

    /// Memory DC from `CreateCompatibleDC`, deleted on drop.
    struct MemoryDc(HDC);

    impl MemoryDc {
        fn compatible_with(screen: &ScreenDc) -> Result<Self> {
            let dc = unsafe { CreateCompatibleDC(screen.0) };
            if dc.is_invalid() {
                return Err(AutomationError::CaptureError(
                    "CreateCompatibleDC failed".into(),
                ));
            }
            Ok(Self(dc))
        }
    }

    impl Drop for MemoryDc {
        fn drop(&mut self) {
            let _ = unsafe { DeleteDC(self.0) };
        }
    }

    /// Compatible bitmap, deleted on drop.
    struct Bitmap(HBITMAP);

    impl Bitmap {
        fn compatible_with(screen: &ScreenDc, width: u32, height: u32) -> Result<Self> {
            let bitmap = unsafe { CreateCompatibleBitmap(screen.0, width as i32, height as i32) };
            if bitmap.is_invalid() {
                return Err(AutomationError::CaptureError(
                    "CreateCompatibleBitmap failed".into(),
                ));
            }
            Ok(Self(bitmap))
        }
    }

    impl Drop for Bitmap {
        fn drop(&mut self) {
            let _ = unsafe { DeleteObject(self.0) };
        }
    }

    /// Selects a bitmap into a memory DC and restores the previous object on
    /// drop, so the bitmap is never deleted while still selected.
    struct Selection<'a> {
        dc: &'a MemoryDc,
        previous: HGDIOBJ,
    }

    impl<'a> Selection<'a> {
        fn select(dc: &'a MemoryDc, bitmap: &Bitmap) -> Self {
            let previous = unsafe { SelectObject(dc.0, bitmap.0) };
            Self { dc, previous }
        }
    }

    impl Drop for Selection<'_> {
        fn drop(&mut self) {
            unsafe { SelectObject(self.dc.0, self.previous) };
        }
    }

    /// Live desktop capture via GDI `BitBlt`.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct GdiFrameProvider;

    impl FrameProvider for GdiFrameProvider {
        fn screen_bounds(&self) -> Result<Region> {
            let (x, y, w, h) = unsafe {
                (
                    GetSystemMetrics(SM_XVIRTUALSCREEN),
                    GetSystemMetrics(SM_YVIRTUALSCREEN),
                    GetSystemMetrics(SM_CXVIRTUALSCREEN),
                    GetSystemMetrics(SM_CYVIRTUALSCREEN),
                )
            };
            if w <= 0 || h <= 0 {
                return Err(AutomationError::CaptureError(format!(
                    "GetSystemMetrics returned invalid virtual screen size: {w}x{h}"
                )));
            }
            Ok(Region::new(x, y, w as u32, h as u32))
        }

        fn grab(&self, region: Region) -> Result<Frame> {
            let (width, height) = (region.width, region.height);

            // Declaration order matters: guards drop in reverse, so the
            // selection is undone before the bitmap and DCs are freed.
            let screen_dc = ScreenDc::acquire()?;
            let mem_dc = MemoryDc::compatible_with(&screen_dc)?;
            let bitmap = Bitmap::compatible_with(&screen_dc, width, height)?;
            let selection = Selection::select(&mem_dc, &bitmap);

            unsafe {
                BitBlt(
                    mem_dc.0,
                    0,
                    0,
                    width as i32,
                    height as i32,
                    screen_dc.0,
                    region.x,
                    region.y,
                    SRCCOPY,
                )
            }
            .map_err(|e| AutomationError::CaptureError(format!("BitBlt failed: {e}")))?;

            // GetDIBits requires the bitmap not to be selected into a DC.
            drop(selection);

            let mut pixels = vec![0u8; width as usize * height as usize * 4];
            let mut bmi = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: width as i32,
                    // Negative height = top-down bitmap (row 0 at top).
                    biHeight: -(height as i32),
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB.0,
                    biSizeImage: 0,
                    biXPelsPerMeter: 0,
                    biYPelsPerMeter: 0,
                    biClrUsed: 0,
                    biClrImportant: 0,
                },
                bmiColors: [Default::default()],
            };

            let lines = unsafe {
                GetDIBits(
                    mem_dc.0,
                    bitmap.0,
                    0,
                    height,
                    Some(pixels.as_mut_ptr() as *mut _),
                    &mut bmi,
                    DIB_RGB_COLORS,
                )
            };
            if lines == 0 {
                return Err(AutomationError::CaptureError("GetDIBits failed".into()));
            }

            Frame::from_bgra(width, height, &pixels)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn screen(w: u32, h: u32) -> Frame {
        let data = (0..w * h)
            .flat_map(|i| [(i % 251) as u8, (i / 7 % 251) as u8, 3])
            .collect();
        Frame::new(w, h, data).unwrap()
    }

    #[test]
    fn test_capture_region_dimensions() {
        let source = FrameSource::new(MemoryFrameProvider::new(screen(40, 30)));
        for (w, h) in [(1, 1), (10, 5), (40, 30), (3, 29)] {
            let f = source.capture(Some(Region::new(0, 0, w, h))).unwrap();
            assert_eq!((f.width(), f.height()), (w, h));
        }
    }

    #[test]
    fn test_capture_full_screen() {
        let source = FrameSource::new(MemoryFrameProvider::new(screen(16, 9)));
        let f = source.capture(None).unwrap();
        assert_eq!((f.width(), f.height()), (16, 9));
    }

    #[test]
    fn test_capture_zero_region_fails() {
        let source = FrameSource::new(MemoryFrameProvider::new(screen(16, 9)));
        let err = source.capture(Some(Region::new(0, 0, 0, 4))).unwrap_err();
        assert!(matches!(err, AutomationError::CaptureError(_)));
    }

    #[test]
    fn test_capture_returns_independent_copy() {
        let source = FrameSource::new(MemoryFrameProvider::new(screen(8, 8)));
        let region = Some(Region::new(2, 2, 4, 4));
        let mut data = source.capture(region).unwrap().into_data();
        data.iter_mut().for_each(|b| *b = 0);
        let again = source.capture(region).unwrap();
        assert_ne!(again.data(), &data[..]);
    }

    struct WrongSize;

    impl FrameProvider for WrongSize {
        fn screen_bounds(&self) -> Result<Region> {
            Ok(Region::new(0, 0, 4, 4))
        }

        fn grab(&self, _region: Region) -> Result<Frame> {
            Frame::new(1, 1, vec![0, 0, 0])
        }
    }

    #[test]
    fn test_capture_rejects_mismatched_provider_frame() {
        let source = FrameSource::new(WrongSize);
        assert!(source.capture(None).is_err());
    }
}
