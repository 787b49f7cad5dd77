//! 蒙皮：顶点权重与 GPU 调色板
//!
//! 调色板固定 64 个列主序 4x4 矩阵，前 `active_bone_count` 个为当前帧蒙皮矩阵，
//! 其余为单位矩阵。顶点端每个顶点最多 4 个影响骨骼，按权重降序排列。

use std::io::{self, Write};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use glam::{Mat4, Vec3};

use super::SkeletonPose;
use crate::skeleton::Skeleton;
use crate::MAX_BONES;

/// 每个顶点的最大影响骨骼数
pub const MAX_INFLUENCES: usize = 4;

// ============================================================================
// 顶点权重
// ============================================================================

/// 顶点蒙皮权重（按权重降序）
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SkinWeight {
    bones: [u8; MAX_INFLUENCES],
    weights: [f32; MAX_INFLUENCES],
    count: u8,
}

impl SkinWeight {
    pub fn new() -> Self {
        Self::default()
    }

    /// 单骨骼全权重
    pub fn single(bone: u8) -> Self {
        let mut w = Self::new();
        w.insert(bone, 1.0);
        w
    }

    /// 插入影响骨骼，保持降序；溢出时丢弃最小权重
    pub fn insert(&mut self, bone: u8, weight: f32) {
        if weight.is_nan() || weight <= 0.0 || bone as usize >= MAX_BONES {
            return;
        }
        let count = self.count as usize;
        if count == MAX_INFLUENCES && weight <= self.weights[MAX_INFLUENCES - 1] {
            return;
        }
        let mut pos = count.min(MAX_INFLUENCES - 1);
        while pos > 0 && self.weights[pos - 1] < weight {
            if pos < MAX_INFLUENCES {
                self.weights[pos] = self.weights[pos - 1];
                self.bones[pos] = self.bones[pos - 1];
            }
            pos -= 1;
        }
        self.weights[pos] = weight;
        self.bones[pos] = bone;
        self.count = (count + 1).min(MAX_INFLUENCES) as u8;
    }

    /// 权重归一化到总和为 1
    pub fn normalize(&mut self) {
        let sum: f32 = self.weights[..self.count as usize].iter().sum();
        if sum > f32::EPSILON {
            for w in &mut self.weights[..self.count as usize] {
                *w /= sum;
            }
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// (骨骼索引, 权重) 迭代
    pub fn influences(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.bones[..self.len()]
            .iter()
            .zip(&self.weights[..self.len()])
            .map(|(&b, &w)| (b as usize, w))
    }

    /// 顶点属性格式：骨骼索引（未使用槽位为 0）
    #[inline]
    pub fn bone_indices(&self) -> [u8; MAX_INFLUENCES] {
        self.bones
    }

    /// 顶点属性格式：权重（未使用槽位为 0）
    #[inline]
    pub fn weights(&self) -> [f32; MAX_INFLUENCES] {
        self.weights
    }
}

// ============================================================================
// 调色板
// ============================================================================

/// GPU 蒙皮矩阵调色板
#[derive(Clone, Debug)]
pub struct SkinningPalette {
    matrices: [Mat4; MAX_BONES],
    active_bone_count: usize,
}

impl Default for SkinningPalette {
    fn default() -> Self {
        Self {
            matrices: [Mat4::IDENTITY; MAX_BONES],
            active_bone_count: 0,
        }
    }
}

impl SkinningPalette {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从姿势缓存的蒙皮矩阵复制
    pub fn update_from_pose(&mut self, pose: &SkeletonPose) {
        let src = pose.skinning_matrices();
        let n = src.len().min(MAX_BONES);
        self.matrices[..n].copy_from_slice(&src[..n]);
        // 之前帧的多余条目重置为单位矩阵
        for m in &mut self.matrices[n..self.active_bone_count.max(n)] {
            *m = Mat4::IDENTITY;
        }
        self.active_bone_count = n;
    }

    /// 直接从姿势全局矩阵计算（不依赖姿势内部缓存）
    pub fn compute(&mut self, skeleton: &Skeleton, pose: &SkeletonPose) {
        let n = skeleton.len().min(pose.len()).min(MAX_BONES);
        pose.calculate_skinning_matrices(skeleton, &mut self.matrices[..n]);
        for m in &mut self.matrices[n..] {
            *m = Mat4::IDENTITY;
        }
        self.active_bone_count = n;
    }

    #[inline]
    pub fn active_bone_count(&self) -> usize {
        self.active_bone_count
    }

    /// 全部 64 个矩阵
    #[inline]
    pub fn matrices(&self) -> &[Mat4; MAX_BONES] {
        &self.matrices
    }

    /// 当前帧有效的矩阵
    #[inline]
    pub fn active(&self) -> &[Mat4] {
        &self.matrices[..self.active_bone_count]
    }

    /// 以小端 f32 列主序写出全部 64 个矩阵（64 × 16 × 4 字节）
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for m in &self.matrices {
            for v in m.to_cols_array() {
                writer.write_f32::<LittleEndian>(v)?;
            }
        }
        Ok(())
    }

    /// 打包为上传用字节，布局与 [`write_to`](Self::write_to) 相同
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; Self::BYTE_SIZE];
        let values = self.matrices.iter().flat_map(|m| m.to_cols_array());
        for (chunk, v) in bytes.chunks_exact_mut(4).zip(values) {
            LittleEndian::write_f32(chunk, v);
        }
        bytes
    }

    pub const BYTE_SIZE: usize = MAX_BONES * 16 * 4;

    /// CPU 线性混合蒙皮：位置 (w=1)
    pub fn skin_position(&self, weights: &SkinWeight, position: Vec3) -> Vec3 {
        weights
            .influences()
            .map(|(b, w)| self.matrices[b].transform_point3(position) * w)
            .sum()
    }

    /// CPU 线性混合蒙皮：法线 (w=0)，结果归一化
    pub fn skin_normal(&self, weights: &SkinWeight, normal: Vec3) -> Vec3 {
        weights
            .influences()
            .map(|(b, w)| self.matrices[b].transform_vector3(normal) * w)
            .sum::<Vec3>()
            .normalize_or_zero()
    }
}
