//! 骨骼节点
//!
//! Bone 只保存静态数据：名称、父子关系、绑定姿势和逆绑定矩阵。
//! 每帧变化的本地变换存放在 SkeletonPose 中。

use bitflags::bitflags;
use glam::{EulerRot, Mat4, Quat, Vec3};

use super::BoneTransform;

// ============================================================================
// 骨骼标志
// ============================================================================

bitflags! {
    /// 骨骼标志位
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct BoneFlags: u32 {
        /// 根骨骼（无父骨骼）
        const ROOT = 1 << 0;
        /// 叶骨骼（无子骨骼）
        const LEAF = 1 << 1;
        /// 配置了关节角度限制
        const HAS_LIMITS = 1 << 2;
    }
}

// ============================================================================
// 关节限制
// ============================================================================

/// 关节角度限制（XYZ 欧拉角，弧度）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JointLimits {
    /// 角度下限
    pub min: Vec3,
    /// 角度上限
    pub max: Vec3,
}

impl JointLimits {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min: min.min(max), max: min.max(max) }
    }

    /// 仅允许绕单轴弯曲（膝盖、肘部）
    pub fn hinge_x(min: f32, max: f32) -> Self {
        Self::new(Vec3::new(min, 0.0, 0.0), Vec3::new(max, 0.0, 0.0))
    }

    /// 限制欧拉角
    #[inline]
    pub fn clamp_euler(&self, euler: Vec3) -> Vec3 {
        euler.clamp(self.min, self.max)
    }

    /// 把旋转限制到角度范围内
    pub fn clamp_rotation(&self, rotation: Quat) -> Quat {
        let (x, y, z) = rotation.to_euler(EulerRot::XYZ);
        let c = self.clamp_euler(Vec3::new(x, y, z));
        Quat::from_euler(EulerRot::XYZ, c.x, c.y, c.z)
    }
}

// ============================================================================
// 骨骼节点
// ============================================================================

/// 骨骼节点
#[derive(Clone, Debug)]
pub struct Bone {
    /// 骨骼名称（骨架内唯一）
    pub name: String,

    /// 骨骼索引
    pub(crate) index: usize,

    /// 父骨骼索引 (-1 表示根骨骼)
    pub parent_index: i32,

    /// 骨骼标志
    pub flags: BoneFlags,

    /// 绑定姿势（相对父骨骼）
    pub bind_pose: BoneTransform,

    /// 逆绑定矩阵（用于蒙皮），添加骨骼时计算
    pub inverse_bind: Mat4,

    /// 估计的骨骼长度
    pub length: f32,

    /// 关节角度限制
    pub limits: Option<JointLimits>,
}

impl Bone {
    pub(crate) fn new(name: String, index: usize, parent_index: i32, bind_pose: BoneTransform) -> Self {
        let mut flags = BoneFlags::LEAF;
        if parent_index < 0 {
            flags.insert(BoneFlags::ROOT);
        }
        Self {
            name,
            index,
            parent_index,
            flags,
            bind_pose,
            inverse_bind: Mat4::IDENTITY,
            length: 0.0,
            limits: None,
        }
    }

    // ========================================
    // 访问器
    // ========================================

    /// 骨骼索引
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// 父骨骼索引
    #[inline]
    pub fn parent_id(&self) -> Option<usize> {
        if self.parent_index >= 0 {
            Some(self.parent_index as usize)
        } else {
            None
        }
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.flags.contains(BoneFlags::ROOT)
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.flags.contains(BoneFlags::LEAF)
    }

    #[inline]
    pub fn has_limits(&self) -> bool {
        self.flags.contains(BoneFlags::HAS_LIMITS)
    }

    /// 绑定姿势的世界矩阵
    #[inline]
    pub fn bind_matrix(&self) -> Mat4 {
        self.inverse_bind.inverse()
    }

    pub(crate) fn set_limits(&mut self, limits: Option<JointLimits>) {
        self.flags.set(BoneFlags::HAS_LIMITS, limits.is_some());
        self.limits = limits;
    }
}
