//! Pipeline stages for screenshot analysis.
//!
//! Each submodule implements one step; only `submit` and `status` touch the
//! network.
//!
//! ## Data Flow
//!
//! ```text
//! normalize ──▶ encode ──▶ submit ──▶ poll ◀──▶ status
//! (≤250 KB PNG)  (base64)  (job handle) (2 s × 30)
//! ```
//!
//! 1. [`normalize`]: decode, crop, resize and recompress until the PNG fits
//!    the encoded budget; CPU-bound, run in `spawn_blocking`
//! 2. [`encode`]: base64-wrap and check against the wire ceiling
//! 3. [`submit`]: launch the remote job and obtain its handle
//! 4. [`poll`]: fixed-interval status loop with a bounded attempt count
//! 5. [`status`]: the [`status::JobStatusSource`] seam and its HTTP impl

pub mod encode;
pub mod normalize;
pub mod poll;
pub mod status;
pub mod submit;
