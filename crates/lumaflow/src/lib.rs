#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use lumaflow_flow as flow;

#[doc(inline)]
pub use lumaflow_image as image;

#[doc(inline)]
pub use lumaflow_imgproc as imgproc;

#[doc(inline)]
pub use lumaflow_io as io;

#[doc(inline)]
pub use lumaflow_tracking as tracking;
