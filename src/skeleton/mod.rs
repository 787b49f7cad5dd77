//! 骨骼系统
//!
//! 核心设计思想：
//! - Bone: 单个骨骼节点的静态数据（绑定姿势、逆绑定矩阵、长度、关节限制）
//! - Skeleton: 有序骨骼集合，父骨骼索引总是小于子骨骼索引
//! - SkeletonFactory: 按形态程序化生成绑定姿势

mod bone;
mod factory;
mod hierarchy;

pub use bone::{Bone, BoneFlags, JointLimits};
pub use factory::{Morphology, SkeletonFactory};
pub(crate) use factory::SIDES;
pub use hierarchy::Skeleton;

use glam::{Mat4, Quat, Vec3};

// ============================================================================
// 公共类型定义
// ============================================================================

/// 骨骼本地变换（平移 / 单位四元数旋转 / 缩放）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoneTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for BoneTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl BoneTransform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    #[inline]
    pub fn new(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self { translation, rotation, scale }
    }

    /// 仅平移
    #[inline]
    pub fn from_translation(translation: Vec3) -> Self {
        Self { translation, ..Self::IDENTITY }
    }

    /// 转换为 4x4 矩阵 (T·R·S)
    #[inline]
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// 从矩阵分解
    #[inline]
    pub fn from_matrix(m: Mat4) -> Self {
        let (scale, rotation, translation) = m.to_scale_rotation_translation();
        Self { translation, rotation, scale }
    }

    /// 插值：平移和缩放线性，旋转球面线性
    #[inline]
    pub fn lerp(a: &Self, b: &Self, t: f32) -> Self {
        Self {
            translation: a.translation.lerp(b.translation, t),
            rotation: a.rotation.slerp(b.rotation, t).normalize(),
            scale: a.scale.lerp(b.scale, t),
        }
    }

    /// 分量近似比较（四元数 q 与 -q 视为相同）
    pub fn abs_diff_eq(&self, other: &Self, eps: f32) -> bool {
        let rot_close = self.rotation.dot(other.rotation).abs() >= 1.0 - eps;
        self.translation.abs_diff_eq(other.translation, eps)
            && self.scale.abs_diff_eq(other.scale, eps)
            && rot_close
    }
}
