//! 程序化生物动画引擎
//!
//! 不依赖关键帧片段，根据每帧的位置、朝向、速度驱动双足、四足、蛇形、
//! 飞行、水生等形态的骨骼，输出可直接上传 GPU 的蒙皮矩阵调色板。
//!
//! 每帧流程（由 [`CreatureAnimator`] 驱动）：
//! 步态时钟推进 → 落脚点计算 → 振荡器叠加 → 腿部 IK → 活动叠加层 → 蒙皮矩阵

pub mod activity;
pub mod animator;
pub mod ik;
pub mod locomotion;
pub mod oscillator;
pub mod pose;
pub mod skeleton;

pub use activity::{ActivityDriver, ActivityOverlay, ActivitySource, OverlayDelta};
pub use animator::{update_animators, AnimatorConfig, CreatureAnimator, CreatureRig};
pub use ik::{IkConfig, IkHandle, IkSolution, IkSystem, IkTarget, PoleVector};
pub use locomotion::{
    FootConfig, FootPlacement, GaitType, GaitTiming, GroundHit, GroundProbe, LocomotionDriver,
};
pub use oscillator::{SpineConfig, SwimConfig, SwimStyle, WingConfig};
pub use pose::{BoneMask, SkeletonPose, SkinWeight, SkinningPalette};
pub use skeleton::{Bone, BoneFlags, BoneTransform, JointLimits, Morphology, Skeleton, SkeletonFactory};

use thiserror::Error;

/// GPU 调色板容量，同时也是骨骼数量上限
pub const MAX_BONES: usize = 64;

/// 引擎错误类型
#[derive(Debug, Error)]
pub enum CreatureError {
    #[error("invalid parent index {parent} for bone '{name}' (skeleton has {len} bones)")]
    InvalidParent { name: String, parent: i32, len: usize },

    #[error("skeleton is full ({max} bones)")]
    Overflow { max: usize },

    #[error("duplicate bone name '{0}'")]
    DuplicateBone(String),

    #[error("unknown bone '{0}'")]
    UnknownBone(String),

    #[error("bone index {index} out of range (skeleton has {len} bones)")]
    BoneOutOfRange { index: usize, len: usize },

    #[error("degenerate IK chain: {0}")]
    DegenerateChain(String),

    #[error("IK target unreachable: distance {distance} exceeds reach {reach}")]
    UnreachableTarget { distance: f32, reach: f32 },

    #[error("IK target weight is zero")]
    InactiveTarget,

    #[error("pose bone count mismatch: expected {expected}, got {actual}")]
    MismatchedPoses { expected: usize, actual: usize },

    #[error("stale or invalid IK chain handle")]
    InvalidHandle,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// 引擎结果类型
pub type Result<T> = std::result::Result<T, CreatureError>;
