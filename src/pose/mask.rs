//! 骨骼遮罩
//!
//! 骨骼数量上限为 64，遮罩直接用一个 u64 位集表示。

use crate::skeleton::Skeleton;
use crate::MAX_BONES;

/// 按骨骼索引的布尔遮罩
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BoneMask(u64);

impl BoneMask {
    pub const EMPTY: Self = Self(0);

    /// 前 `bone_count` 个骨骼全部选中
    pub fn all(bone_count: usize) -> Self {
        if bone_count >= MAX_BONES {
            Self(u64::MAX)
        } else {
            Self((1u64 << bone_count) - 1)
        }
    }

    pub fn from_bones(bones: &[usize]) -> Self {
        let mut mask = Self::EMPTY;
        for &b in bones {
            mask.insert(b);
        }
        mask
    }

    /// 骨骼自身及其所有后代
    pub fn from_subtree(skeleton: &Skeleton, root: usize) -> Self {
        let mut mask = Self::EMPTY;
        if root >= skeleton.len() {
            return mask;
        }
        mask.insert(root);
        // 后代的索引总是大于祖先
        for i in root + 1..skeleton.len() {
            if let Some(parent) = skeleton.parent(i) {
                if mask.contains(parent) {
                    mask.insert(i);
                }
            }
        }
        mask
    }

    #[inline]
    pub fn contains(&self, bone: usize) -> bool {
        bone < MAX_BONES && self.0 & (1u64 << bone) != 0
    }

    #[inline]
    pub fn insert(&mut self, bone: usize) {
        if bone < MAX_BONES {
            self.0 |= 1u64 << bone;
        }
    }

    #[inline]
    pub fn remove(&mut self, bone: usize) {
        if bone < MAX_BONES {
            self.0 &= !(1u64 << bone);
        }
    }

    #[inline]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn bits(&self) -> u64 {
        self.0
    }
}
