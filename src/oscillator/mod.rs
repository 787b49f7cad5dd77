//! 振荡器
//!
//! 翅膀扇动、脊柱波动、游泳身体波。所有振荡器都把旋转增量左乘到骨骼本地旋转上，
//! 每帧姿势先复位到绑定姿势，因此增量不会跨帧累积。

mod spine;
mod swim;
mod wing;

pub use spine::SpineConfig;
pub use swim::{SwimAnimator, SwimConfig, SwimStyle};
pub use wing::WingConfig;
