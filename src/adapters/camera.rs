//! Camera frame source (OV2640 through the `esp32-camera` component).
//!
//! QQVGA JPEG at quality 20, two DRAM frame buffers, grab-latest so a
//! frame taken after an idle stretch is fresh.  Every frame is a
//! [`CameraFrame`] guard that hands its buffer back to the driver when it
//! is released or dropped, so the two-buffer pool cannot leak and a
//! double release does not type-check.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: `esp_camera_fb_get` / `esp_camera_fb_return`.
//! On host/test: replays a script of simulated shots through the same
//! two-buffer accounting.

use log::info;

use crate::error::CaptureError;
use crate::frame::{CapturedFrame, FrameView, PixelEncoding};

/// Frame buffers shared between the driver and the application.
pub const FRAME_BUFFER_COUNT: usize = 2;

/// Frames thrown away right after init; the first JPEGs are often stale.
const FLUSH_FRAMES: usize = 2;

// ───────────────────────────────────────────────────────────────
// ESP-IDF implementation
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod imp {
    use core::ptr::NonNull;

    use esp_idf_svc::sys::camera::*;
    use esp_idf_svc::sys::ESP_OK;

    use super::*;
    use crate::pins;

    pub struct Camera {
        _private: (),
    }

    pub struct CameraFrame {
        fb: NonNull<camera_fb_t>,
    }

    impl Camera {
        pub fn init() -> Result<Self, CaptureError> {
            let d = pins::CAM_DATA_GPIOS;
            let config = camera_config_t {
                pin_pwdn: pins::CAM_PWDN_GPIO,
                pin_reset: pins::CAM_RESET_GPIO,
                pin_xclk: pins::CAM_XCLK_GPIO,
                __bindgen_anon_1: camera_config_t__bindgen_ty_1 {
                    pin_sccb_sda: pins::CAM_SIOD_GPIO,
                },
                __bindgen_anon_2: camera_config_t__bindgen_ty_2 {
                    pin_sccb_scl: pins::CAM_SIOC_GPIO,
                },
                sccb_i2c_port: pins::CAM_SCCB_I2C_PORT,
                pin_d0: d[0],
                pin_d1: d[1],
                pin_d2: d[2],
                pin_d3: d[3],
                pin_d4: d[4],
                pin_d5: d[5],
                pin_d6: d[6],
                pin_d7: d[7],
                pin_vsync: pins::CAM_VSYNC_GPIO,
                pin_href: pins::CAM_HREF_GPIO,
                pin_pclk: pins::CAM_PCLK_GPIO,
                xclk_freq_hz: pins::CAM_XCLK_FREQ_HZ,
                ledc_timer: pins::CAM_LEDC_TIMER,
                ledc_channel: pins::CAM_LEDC_CHANNEL,
                pixel_format: pixformat_t_PIXFORMAT_JPEG,
                frame_size: framesize_t_FRAMESIZE_QQVGA,
                jpeg_quality: 20,
                fb_count: FRAME_BUFFER_COUNT,
                fb_location: camera_fb_location_t_CAMERA_FB_IN_DRAM,
                grab_mode: camera_grab_mode_t_CAMERA_GRAB_LATEST,
                ..Default::default()
            };

            // SAFETY: config lives across the call; the driver copies it.
            let ret = unsafe { esp_camera_init(&config) };
            if ret != ESP_OK as i32 {
                log::error!("camera: esp_camera_init failed (rc={})", ret);
                return Err(CaptureError::Driver(ret));
            }

            let mut camera = Self { _private: () };
            for _ in 0..FLUSH_FRAMES {
                // Dropping returns the buffer.
                let _ = camera.capture();
                esp_idf_hal::delay::FreeRtos::delay_ms(30);
            }
            info!("camera: ready (QQVGA/JPEG, {} buffers)", FRAME_BUFFER_COUNT);
            Ok(camera)
        }

        pub fn capture(&mut self) -> Result<CameraFrame, CaptureError> {
            // SAFETY: driver initialised in `init`; a null return means no
            // buffer was ready.
            let fb = unsafe { esp_camera_fb_get() };
            NonNull::new(fb)
                .map(|fb| CameraFrame { fb })
                .ok_or(CaptureError::BufferUnavailable)
        }
    }

    impl CapturedFrame for CameraFrame {
        fn view(&self) -> FrameView<'_> {
            // SAFETY: the buffer stays owned by this guard until drop.
            let fb = unsafe { self.fb.as_ref() };
            let data = unsafe { core::slice::from_raw_parts(fb.buf, fb.len) };
            FrameView {
                data,
                width: fb.width as u16,
                height: fb.height as u16,
                encoding: if fb.format == pixformat_t_PIXFORMAT_JPEG {
                    PixelEncoding::Jpeg
                } else {
                    PixelEncoding::Raw
                },
            }
        }
    }

    impl Drop for CameraFrame {
        fn drop(&mut self) {
            // SAFETY: obtained from esp_camera_fb_get and returned once.
            unsafe { esp_camera_fb_return(self.fb.as_ptr()) };
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Host simulation
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
mod imp {
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use super::*;

    /// One simulated capture.
    #[derive(Debug, Clone)]
    pub struct SimShot {
        pub data: Vec<u8>,
        pub width: u16,
        pub height: u16,
        pub encoding: PixelEncoding,
    }

    impl SimShot {
        pub fn jpeg(data: Vec<u8>, width: u16, height: u16) -> Self {
            Self {
                data,
                width,
                height,
                encoding: PixelEncoding::Jpeg,
            }
        }
    }

    /// Replays its script, then repeats the last entry.
    pub struct Camera {
        script: VecDeque<Result<SimShot, CaptureError>>,
        in_flight: Rc<Cell<usize>>,
    }

    pub struct CameraFrame {
        shot: SimShot,
        in_flight: Rc<Cell<usize>>,
    }

    impl Camera {
        pub fn init() -> Result<Self, CaptureError> {
            Ok(Self::with_script(Vec::new()))
        }

        pub fn with_script(script: Vec<Result<SimShot, CaptureError>>) -> Self {
            info!("camera(sim): {} scripted shots", script.len());
            Self {
                script: script.into(),
                in_flight: Rc::new(Cell::new(0)),
            }
        }

        pub fn capture(&mut self) -> Result<CameraFrame, CaptureError> {
            if self.in_flight.get() >= FRAME_BUFFER_COUNT {
                return Err(CaptureError::BufferUnavailable);
            }
            let next = if self.script.len() > 1 {
                self.script.pop_front()
            } else {
                self.script.front().cloned()
            };
            let shot = next.unwrap_or(Err(CaptureError::BufferUnavailable))?;
            self.in_flight.set(self.in_flight.get() + 1);
            Ok(CameraFrame {
                shot,
                in_flight: Rc::clone(&self.in_flight),
            })
        }

        /// Frames currently held by the application.
        pub fn in_flight(&self) -> usize {
            self.in_flight.get()
        }
    }

    impl CapturedFrame for CameraFrame {
        fn view(&self) -> FrameView<'_> {
            FrameView {
                data: &self.shot.data,
                width: self.shot.width,
                height: self.shot.height,
                encoding: self.shot.encoding,
            }
        }
    }

    impl Drop for CameraFrame {
        fn drop(&mut self) {
            self.in_flight.set(self.in_flight.get().saturating_sub(1));
        }
    }
}

#[cfg(not(target_os = "espidf"))]
pub use imp::SimShot;
pub use imp::{Camera, CameraFrame};

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;

    fn shot() -> SimShot {
        SimShot::jpeg(vec![0xFF, 0xD8, 0xFF, 0xD9], 160, 120)
    }

    #[test]
    fn pool_runs_dry_until_release() {
        let mut cam = Camera::with_script(vec![Ok(shot())]);
        let a = cam.capture().unwrap();
        let b = cam.capture().unwrap();
        assert_eq!(cam.capture().err(), Some(CaptureError::BufferUnavailable));
        drop(a);
        assert_eq!(cam.in_flight(), 1);
        let c = cam.capture().unwrap();
        assert_eq!(c.view().width, 160);
        drop((b, c));
        assert_eq!(cam.in_flight(), 0);
    }

    #[test]
    fn script_replays_failures_in_order() {
        let mut cam = Camera::with_script(vec![Err(CaptureError::Driver(-1)), Ok(shot())]);
        assert_eq!(cam.capture().err(), Some(CaptureError::Driver(-1)));
        assert!(cam.capture().is_ok());
        assert!(cam.capture().is_ok());
    }

    #[test]
    fn empty_script_has_no_frames() {
        let mut cam = Camera::init().unwrap();
        assert_eq!(cam.capture().err(), Some(CaptureError::BufferUnavailable));
    }
}
