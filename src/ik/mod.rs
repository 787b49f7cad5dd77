//! IK 求解器
//!
//! 设计原则：
//! - 求解器是 (姿势, 链, 目标, 配置) → 成功/失败 的函数，直接修改姿势本地变换
//! - 两骨骼 IK 解析求解；FABRIK / CCD 迭代求解，适合脊柱、尾巴等长链
//! - 链管理器按优先级调度所有链，单条链失败只跳过该链

mod ccd;
mod chain;
mod fabrik;
mod two_bone;

pub use ccd::solve_ccd;
pub use chain::{ChainSolver, IkChainDef, IkChainEntry, IkHandle, IkSystem, LookAtTarget};
pub use fabrik::{solve_fabrik, solve_fabrik_constrained, AngleRange};
pub use two_bone::solve_two_bone;

use glam::{Quat, Vec3};

use crate::pose::SkeletonPose;
use crate::skeleton::{BoneTransform, Skeleton};
use crate::{CreatureError, Result, MAX_BONES};

/// 方向向量长度低于此值视为退化
const EPSILON: f32 = 1e-6;

// ============================================================================
// 配置与目标
// ============================================================================

/// IK 配置（三种求解器共享）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IkConfig {
    /// 最大迭代次数
    pub max_iterations: u32,
    /// 位置容差
    pub tolerance: f32,
    /// CCD 每步旋转的阻尼系数 (0, 1]
    pub damping: f32,
    /// 接近完全伸直时的软限制比例
    pub soft_limit: f32,
    /// 最小弯曲角（弧度）
    pub min_bend_angle: f32,
    /// CCD 单步最大旋转角（弧度）
    pub max_step_angle: f32,
}

impl Default for IkConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            tolerance: 1e-3,
            damping: 1.0,
            soft_limit: 0.9999,
            min_bend_angle: 0.0,
            max_step_angle: std::f32::consts::PI,
        }
    }
}

/// IK 目标（模型空间）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IkTarget {
    pub position: Vec3,
    /// 末端骨骼的目标全局旋转
    pub rotation: Option<Quat>,
    /// 与求解前姿势的混合权重 [0, 1]
    pub weight: f32,
}

impl Default for IkTarget {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: None,
            weight: 1.0,
        }
    }
}

impl IkTarget {
    pub fn at(position: Vec3) -> Self {
        Self { position, ..Self::default() }
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = Some(rotation);
        self
    }
}

/// 极向量：确定两骨骼链的弯曲平面
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PoleVector {
    pub position: Vec3,
    pub weight: f32,
    pub enabled: bool,
}

impl PoleVector {
    pub fn new(position: Vec3, weight: f32) -> Self {
        Self { position, weight, enabled: true }
    }
}

/// 求解结果
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IkSolution {
    /// 实际迭代次数
    pub iterations: u32,
    /// 末端到目标的剩余距离
    pub distance: f32,
    /// 两骨骼 IK 目标超出范围时沿目标方向伸直
    pub extended: bool,
}

// ============================================================================
// 预分配缓冲区
// ============================================================================

/// 迭代求解器的临时缓冲区，容量按最大链长预留，避免每帧分配
#[derive(Clone, Debug)]
pub struct IkScratch {
    pub(crate) positions: Vec<Vec3>,
    pub(crate) lengths: Vec<f32>,
    pub(crate) original: Vec<BoneTransform>,
    pub(crate) best: Vec<BoneTransform>,
}

impl Default for IkScratch {
    fn default() -> Self {
        Self::with_capacity(MAX_BONES)
    }
}

impl IkScratch {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            positions: Vec::with_capacity(capacity),
            lengths: Vec::with_capacity(capacity),
            original: Vec::with_capacity(capacity),
            best: Vec::with_capacity(capacity),
        }
    }

    fn clear(&mut self) {
        self.positions.clear();
        self.lengths.clear();
        self.original.clear();
        self.best.clear();
    }
}

// ============================================================================
// 公共工具
// ============================================================================

/// 检查链：至少两个骨骼，逐个父子相连，段长非零
pub(crate) fn validate_chain(skeleton: &Skeleton, pose: &SkeletonPose, chain: &[usize]) -> Result<()> {
    if chain.len() < 2 {
        return Err(CreatureError::DegenerateChain(format!(
            "chain needs at least 2 bones, got {}",
            chain.len()
        )));
    }
    let len = skeleton.len();
    if pose.len() != len {
        return Err(CreatureError::MismatchedPoses { expected: len, actual: pose.len() });
    }
    for &b in chain {
        if b >= len {
            return Err(CreatureError::BoneOutOfRange { index: b, len });
        }
    }
    for pair in chain.windows(2) {
        if skeleton.parent(pair[1]) != Some(pair[0]) {
            return Err(CreatureError::DegenerateChain(format!(
                "bone {} is not the parent of bone {}",
                pair[0], pair[1]
            )));
        }
    }
    Ok(())
}

/// 检查目标权重
#[inline]
pub(crate) fn check_weight(target: &IkTarget) -> Result<f32> {
    if target.weight > 0.0 && target.weight.is_finite() {
        Ok(target.weight.min(1.0))
    } else {
        Err(CreatureError::InactiveTarget)
    }
}

/// 求解结果按权重与求解前本地旋转混合
pub(crate) fn blend_with_original(pose: &mut SkeletonPose, chain: &[usize], original: &[BoneTransform], weight: f32) {
    if weight >= 1.0 {
        return;
    }
    for (&bone, orig) in chain.iter().zip(original) {
        if let Some(local) = pose.local_mut(bone) {
            *local = BoneTransform::lerp(orig, local, weight);
        }
    }
}

/// 旋转增量按系数缩放（从单位旋转 slerp）
#[inline]
pub(crate) fn scale_rotation(rotation: Quat, factor: f32) -> Quat {
    if factor >= 1.0 {
        rotation
    } else {
        Quat::IDENTITY.slerp(rotation, factor.max(0.0)).normalize()
    }
}

/// 限制旋转角度
#[inline]
pub(crate) fn limit_rotation(rotation: Quat, max_angle: f32) -> Quat {
    // 取 w >= 0 的表示，保证角度在 [0, π]
    let rotation = if rotation.w < 0.0 { -rotation } else { rotation };
    let (axis, angle) = rotation.to_axis_angle();
    if angle > max_angle && axis.length_squared() > EPSILON {
        Quat::from_axis_angle(axis.normalize(), max_angle)
    } else {
        rotation
    }
}

/// 两个方向之间的最短旋转，任一方向退化时返回 None
#[inline]
pub(crate) fn arc_between(from: Vec3, to: Vec3) -> Option<Quat> {
    let from = from.normalize_or_zero();
    let to = to.normalize_or_zero();
    if from == Vec3::ZERO || to == Vec3::ZERO {
        None
    } else {
        Some(Quat::from_rotation_arc(from, to))
    }
}
