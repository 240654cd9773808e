pub mod codec;
pub mod color;
pub mod graphdef;
pub mod seq;
pub mod theme;

pub use codec::{CodecError, V2_VERSION};
pub use color::{Color, ColorParseError};
pub use graphdef::{Axis, GraphDef, GraphDefError, Layout, LineDef, LineStyle, Plot, VSpanDef};
pub use seq::{SeqError, TimeSeq};
pub use theme::{Palette, Theme};
