//! 姿势
//!
//! SkeletonPose 保存三组按骨骼索引排列的数据：本地变换、全局矩阵缓存、蒙皮矩阵缓存。
//! 姿势只按形状（骨骼数量）与骨架绑定，骨架在每次需要层级的操作中传入。

mod blend;
mod mask;
mod skin;

pub use mask::BoneMask;
pub use skin::{SkinWeight, SkinningPalette, MAX_INFLUENCES};

use glam::{Mat4, Quat, Vec3};

use crate::skeleton::{BoneTransform, Skeleton};
use crate::{CreatureError, Result};

/// 骨架姿势
#[derive(Clone, Debug, Default)]
pub struct SkeletonPose {
    /// 本地变换
    locals: Vec<BoneTransform>,
    /// 全局矩阵（模型空间）
    globals: Vec<Mat4>,
    /// 蒙皮矩阵 = globals · inverse_bind
    skinning: Vec<Mat4>,
}

impl SkeletonPose {
    /// 创建单位姿势
    pub fn new(bone_count: usize) -> Self {
        Self {
            locals: vec![BoneTransform::IDENTITY; bone_count],
            globals: vec![Mat4::IDENTITY; bone_count],
            skinning: vec![Mat4::IDENTITY; bone_count],
        }
    }

    /// 创建绑定姿势并计算矩阵
    pub fn from_skeleton(skeleton: &Skeleton) -> Self {
        let mut pose = Self::new(skeleton.len());
        pose.set_to_bind_pose(skeleton);
        pose.update_matrices(skeleton);
        pose
    }

    // ========================================
    // 访问器
    // ========================================

    #[inline]
    pub fn len(&self) -> usize {
        self.locals.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.locals.is_empty()
    }

    #[inline]
    pub fn locals(&self) -> &[BoneTransform] {
        &self.locals
    }

    #[inline]
    pub fn locals_mut(&mut self) -> &mut [BoneTransform] {
        &mut self.locals
    }

    #[inline]
    pub fn local(&self, index: usize) -> Option<&BoneTransform> {
        self.locals.get(index)
    }

    #[inline]
    pub fn local_mut(&mut self, index: usize) -> Option<&mut BoneTransform> {
        self.locals.get_mut(index)
    }

    #[inline]
    pub fn globals(&self) -> &[Mat4] {
        &self.globals
    }

    #[inline]
    pub fn global(&self, index: usize) -> Mat4 {
        self.globals.get(index).copied().unwrap_or(Mat4::IDENTITY)
    }

    /// 全局位置（模型空间）
    #[inline]
    pub fn global_position(&self, index: usize) -> Vec3 {
        self.global(index).w_axis.truncate()
    }

    /// 全局旋转（去除缩放）
    #[inline]
    pub fn global_rotation(&self, index: usize) -> Quat {
        let (_, rotation, _) = self.global(index).to_scale_rotation_translation();
        rotation
    }

    /// 父骨骼的全局旋转，根骨骼返回单位旋转
    #[inline]
    pub fn parent_global_rotation(&self, skeleton: &Skeleton, index: usize) -> Quat {
        skeleton
            .parent(index)
            .map_or(Quat::IDENTITY, |p| self.global_rotation(p))
    }

    /// 上一次 `update_matrices` 产生的蒙皮矩阵
    #[inline]
    pub fn skinning_matrices(&self) -> &[Mat4] {
        &self.skinning
    }

    /// 与另一个姿势形状一致
    pub fn check_shape(&self, other: &SkeletonPose) -> Result<()> {
        if self.len() == other.len() {
            Ok(())
        } else {
            Err(CreatureError::MismatchedPoses {
                expected: self.len(),
                actual: other.len(),
            })
        }
    }

    fn check_skeleton(&self, skeleton: &Skeleton) -> bool {
        let ok = self.len() == skeleton.len();
        if !ok {
            log::warn!(
                "[Pose] 姿势与骨架骨骼数不一致: {} vs {}",
                self.len(),
                skeleton.len()
            );
        }
        ok
    }

    // ========================================
    // 变换计算
    // ========================================

    /// 复制每个骨骼的绑定本地变换
    pub fn set_to_bind_pose(&mut self, skeleton: &Skeleton) {
        if self.len() != skeleton.len() {
            *self = Self::new(skeleton.len());
        }
        for (local, bone) in self.locals.iter_mut().zip(skeleton.bones()) {
            *local = bone.bind_pose;
        }
    }

    /// 按索引顺序计算全局变换（父骨骼总在子骨骼之前）
    pub fn calculate_global_transforms(&mut self, skeleton: &Skeleton) {
        self.calculate_global_transforms_from(skeleton, 0);
    }

    /// 从 `start` 开始重算全局变换
    ///
    /// 索引小于 `start` 的骨骼不会被修改，调用者保证它们仍然有效。
    pub fn calculate_global_transforms_from(&mut self, skeleton: &Skeleton, start: usize) {
        if !self.check_skeleton(skeleton) {
            return;
        }
        for i in start..self.locals.len() {
            let local = self.locals[i].to_matrix();
            self.globals[i] = match skeleton.parent(i) {
                Some(parent) => self.globals[parent] * local,
                None => local,
            };
        }
    }

    /// 计算蒙皮矩阵到外部缓冲区：out[i] = global[i] · inverse_bind[i]
    pub fn calculate_skinning_matrices(&self, skeleton: &Skeleton, out: &mut [Mat4]) {
        for ((dst, global), bone) in out.iter_mut().zip(&self.globals).zip(skeleton.bones()) {
            *dst = *global * bone.inverse_bind;
        }
    }

    /// 重算全局矩阵和蒙皮矩阵，每帧在所有姿势修改之后调用一次
    pub fn update_matrices(&mut self, skeleton: &Skeleton) {
        self.calculate_global_transforms(skeleton);
        let mut skinning = std::mem::take(&mut self.skinning);
        self.calculate_skinning_matrices(skeleton, &mut skinning);
        self.skinning = skinning;
    }

    /// 在世界空间中对骨骼施加旋转增量（左乘到全局旋转上），
    /// 并转换回本地空间。不会刷新全局矩阵。
    pub fn rotate_global(&mut self, skeleton: &Skeleton, index: usize, delta: Quat) {
        let parent_rot = self.parent_global_rotation(skeleton, index);
        if let Some(local) = self.locals.get_mut(index) {
            let local_delta = parent_rot.inverse() * delta * parent_rot;
            local.rotation = (local_delta * local.rotation).normalize();
        }
    }
}
