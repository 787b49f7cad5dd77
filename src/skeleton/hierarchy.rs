//! 骨架层级
//!
//! 骨骼按索引拓扑有序：父骨骼必须先于子骨骼添加，
//! 因此按索引顺序遍历即可自上而下计算全局变换。

use std::collections::HashMap;

use glam::Mat4;

use super::bone::{Bone, BoneFlags, JointLimits};
use super::BoneTransform;
use crate::{CreatureError, Result, MAX_BONES};

/// 叶骨骼没有可参考的链时使用的默认长度
const DEFAULT_BONE_LENGTH: f32 = 0.1;

/// 骨架：有序骨骼集合
#[derive(Clone, Debug, Default)]
pub struct Skeleton {
    bones: Vec<Bone>,
    name_to_index: HashMap<String, usize>,
    /// 子骨骼缓存（按添加顺序）
    children: Vec<Vec<usize>>,
    /// 绑定姿势的全局矩阵
    bind_globals: Vec<Mat4>,
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================
    // 构建
    // ========================================

    /// 添加骨骼，返回新骨骼索引
    ///
    /// 父骨骼必须已存在（`parent_index` 为 -1 表示根骨骼）。
    /// 添加后立即计算该骨骼的逆绑定矩阵。
    pub fn add_bone(
        &mut self,
        name: impl Into<String>,
        parent_index: i32,
        bind_local: BoneTransform,
    ) -> Result<usize> {
        let name = name.into();
        let index = self.bones.len();

        if index >= MAX_BONES {
            return Err(CreatureError::Overflow { max: MAX_BONES });
        }
        if parent_index < -1 || parent_index >= index as i32 {
            return Err(CreatureError::InvalidParent {
                name,
                parent: parent_index,
                len: index,
            });
        }
        if self.name_to_index.contains_key(&name) {
            return Err(CreatureError::DuplicateBone(name));
        }

        let bind_local_matrix = bind_local.to_matrix();
        let bind_global = if parent_index >= 0 {
            let parent = parent_index as usize;
            self.bones[parent].flags.remove(BoneFlags::LEAF);
            self.children[parent].push(index);
            self.bind_globals[parent] * bind_local_matrix
        } else {
            bind_local_matrix
        };

        let mut bone = Bone::new(name.clone(), index, parent_index, bind_local);
        bone.inverse_bind = bind_global.inverse();

        self.name_to_index.insert(name, index);
        self.bones.push(bone);
        self.children.push(Vec::new());
        self.bind_globals.push(bind_global);

        Ok(index)
    }

    /// 按名称指定父骨骼添加
    pub fn add_child(&mut self, name: impl Into<String>, parent: &str, bind_local: BoneTransform) -> Result<usize> {
        let parent_index = self
            .find_bone(parent)
            .ok_or_else(|| CreatureError::UnknownBone(parent.to_string()))?;
        self.add_bone(name, parent_index as i32, bind_local)
    }

    /// 计算骨骼长度
    ///
    /// 有子骨骼：到第一个子骨骼的距离；叶骨骼：父骨骼长度的一半；
    /// 孤立的根骨骼使用默认长度。
    pub fn calculate_bone_lengths(&mut self) {
        for i in 0..self.bones.len() {
            let length = if let Some(&first_child) = self.children[i].first() {
                let from = self.bind_globals[i].w_axis.truncate();
                let to = self.bind_globals[first_child].w_axis.truncate();
                from.distance(to)
            } else if let Some(parent) = self.bones[i].parent_id() {
                self.bones[parent].length * 0.5
            } else {
                DEFAULT_BONE_LENGTH
            };
            self.bones[i].length = length;
        }
    }

    /// 设置关节限制
    pub fn set_joint_limits(&mut self, index: usize, limits: Option<JointLimits>) -> Result<()> {
        let len = self.bones.len();
        let bone = self
            .bones
            .get_mut(index)
            .ok_or(CreatureError::BoneOutOfRange { index, len })?;
        bone.set_limits(limits);
        Ok(())
    }

    /// 修改绑定姿势（不会自动重算逆绑定矩阵，需调用 `rebuild_bind_matrices`）
    pub fn set_bind_local(&mut self, index: usize, bind_local: BoneTransform) -> Result<()> {
        let len = self.bones.len();
        let bone = self
            .bones
            .get_mut(index)
            .ok_or(CreatureError::BoneOutOfRange { index, len })?;
        bone.bind_pose = bind_local;
        Ok(())
    }

    /// 显式重建所有绑定全局矩阵和逆绑定矩阵
    pub fn rebuild_bind_matrices(&mut self) {
        for i in 0..self.bones.len() {
            let local = self.bones[i].bind_pose.to_matrix();
            let global = match self.bones[i].parent_id() {
                Some(parent) => self.bind_globals[parent] * local,
                None => local,
            };
            self.bind_globals[i] = global;
            self.bones[i].inverse_bind = global.inverse();
        }
        log::debug!("[Skeleton] 重建绑定矩阵: {} 个骨骼", self.bones.len());
    }

    // ========================================
    // 查询
    // ========================================

    #[inline]
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    #[inline]
    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    #[inline]
    pub fn bone(&self, index: usize) -> Option<&Bone> {
        self.bones.get(index)
    }

    /// 按名称查找骨骼索引
    #[inline]
    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// 按名称查找，找不到时返回错误
    pub fn require_bone(&self, name: &str) -> Result<usize> {
        self.find_bone(name)
            .ok_or_else(|| CreatureError::UnknownBone(name.to_string()))
    }

    /// 父骨骼索引
    #[inline]
    pub fn parent(&self, index: usize) -> Option<usize> {
        self.bones.get(index).and_then(Bone::parent_id)
    }

    /// 所有根骨骼
    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.bones.iter().filter(|b| b.is_root()).map(|b| b.index)
    }

    /// 直接子骨骼
    #[inline]
    pub fn children(&self, index: usize) -> &[usize] {
        self.children.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `ancestor` 是否为 `bone` 的祖先（不含自身）
    pub fn is_ancestor(&self, ancestor: usize, bone: usize) -> bool {
        let mut current = self.parent(bone);
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = self.parent(p);
        }
        false
    }

    /// 从 `start` 到 `end` 的骨骼路径（含两端，按根到末端排列）
    pub fn chain_between(&self, start: usize, end: usize) -> Option<Vec<usize>> {
        if start >= self.len() || end >= self.len() {
            return None;
        }
        let mut chain = vec![end];
        let mut current = end;
        while current != start {
            current = self.parent(current)?;
            chain.push(current);
        }
        chain.reverse();
        Some(chain)
    }

    /// 绑定姿势的全局矩阵
    #[inline]
    pub fn bind_global(&self, index: usize) -> Mat4 {
        self.bind_globals.get(index).copied().unwrap_or(Mat4::IDENTITY)
    }

    /// 绑定姿势下的模型空间位置
    #[inline]
    pub fn bind_position(&self, index: usize) -> glam::Vec3 {
        self.bind_global(index).w_axis.truncate()
    }

    /// 结构有效性检查
    pub fn is_valid(&self) -> bool {
        if self.bones.is_empty() || self.bones.len() > MAX_BONES {
            return false;
        }
        let ordered = self
            .bones
            .iter()
            .enumerate()
            .all(|(i, b)| b.parent_index < i as i32 && b.parent_index >= -1);
        ordered && self.roots().next().is_some()
    }
}
