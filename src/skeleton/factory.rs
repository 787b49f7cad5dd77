//! 骨架工厂
//!
//! 为常见形态生成程序化绑定姿势。所有尺寸参数以世界单位表示，
//! 脚踝（或腕部）在绑定姿势中位于 y = 0 的地面上，身体朝向 +Z，左侧为 +X。

use glam::Vec3;

use super::{BoneTransform, Skeleton};
use crate::{CreatureError, Result, MAX_BONES};

/// 生物形态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Morphology {
    Biped,
    Quadruped,
    Serpentine,
    Flying,
    Aquatic,
}

/// 左右两侧（后缀, X 方向符号）
pub(crate) const SIDES: [(&str, f32); 2] = [("l", 1.0), ("r", -1.0)];

/// 骨架工厂
pub struct SkeletonFactory;

impl SkeletonFactory {
    /// 蛇形和水生形态的默认分段数
    pub const DEFAULT_SEGMENTS: usize = 8;

    /// 按形态构建，分段型形态使用默认分段数
    pub fn build(morphology: Morphology, size: f32) -> Result<Skeleton> {
        match morphology {
            Morphology::Biped => Self::biped(size),
            Morphology::Quadruped => Self::quadruped(size),
            Morphology::Serpentine => Self::serpentine(size, Self::DEFAULT_SEGMENTS),
            Morphology::Flying => Self::flying(size),
            Morphology::Aquatic => Self::aquatic(size, Self::DEFAULT_SEGMENTS),
        }
    }

    /// 双足：骨盆-脊柱×3-颈-头，双臂（锁骨/肩/肘/腕），双腿（髋/膝/踝/脚）
    pub fn biped(height: f32) -> Result<Skeleton> {
        let h = Self::check_size(height)?;
        let mut s = Skeleton::new();

        s.add_bone("pelvis", -1, at(0.0, 0.5 * h, 0.0))?;
        s.add_child("spine_01", "pelvis", at(0.0, 0.1 * h, 0.0))?;
        s.add_child("spine_02", "spine_01", at(0.0, 0.1 * h, 0.0))?;
        s.add_child("spine_03", "spine_02", at(0.0, 0.1 * h, 0.0))?;
        s.add_child("neck", "spine_03", at(0.0, 0.08 * h, 0.0))?;
        s.add_child("head", "neck", at(0.0, 0.07 * h, 0.0))?;

        for (side, x) in SIDES {
            let clavicle = format!("clavicle_{side}");
            let shoulder = format!("shoulder_{side}");
            let elbow = format!("elbow_{side}");
            s.add_child(clavicle.as_str(), "spine_03", at(x * 0.03 * h, 0.06 * h, 0.0))?;
            s.add_child(shoulder.as_str(), &clavicle, at(x * 0.08 * h, 0.0, 0.0))?;
            s.add_child(elbow.as_str(), &shoulder, at(x * 0.15 * h, 0.0, 0.0))?;
            s.add_child(format!("wrist_{side}"), &elbow, at(x * 0.14 * h, 0.0, 0.0))?;
        }

        for (side, x) in SIDES {
            let hip = format!("hip_{side}");
            let knee = format!("knee_{side}");
            let ankle = format!("ankle_{side}");
            s.add_child(hip.as_str(), "pelvis", at(x * 0.09 * h, 0.0, 0.0))?;
            // 膝盖略向前弯曲，确定腿部 IK 的弯曲平面
            s.add_child(knee.as_str(), &hip, at(0.0, -0.24 * h, 0.02 * h))?;
            s.add_child(ankle.as_str(), &knee, at(0.0, -0.26 * h, -0.02 * h))?;
            s.add_child(format!("foot_{side}"), &ankle, at(0.0, 0.0, 0.1 * h))?;
        }

        Self::finish(s, Morphology::Biped)
    }

    /// 四足：骨盆 + 三节脊柱 + 颈头，四肢（前：肩/肘/腕/爪，后：髋/膝/跗/爪），三节尾巴
    ///
    /// 脚的顺序为 前左、前右、后左、后右。
    pub fn quadruped(size: f32) -> Result<Skeleton> {
        let sz = Self::check_size(size)?;
        let mut s = Skeleton::new();

        s.add_bone("pelvis", -1, at(0.0, 0.6 * sz, -0.4 * sz))?;
        s.add_child("spine_01", "pelvis", at(0.0, 0.0, 0.27 * sz))?;
        s.add_child("spine_02", "spine_01", at(0.0, 0.0, 0.27 * sz))?;
        s.add_child("spine_03", "spine_02", at(0.0, 0.0, 0.26 * sz))?;
        s.add_child("neck", "spine_03", at(0.0, 0.1 * sz, 0.1 * sz))?;
        s.add_child("head", "neck", at(0.0, 0.05 * sz, 0.15 * sz))?;

        for (side, x) in SIDES {
            let shoulder = format!("shoulder_f{side}");
            let elbow = format!("elbow_f{side}");
            let wrist = format!("wrist_f{side}");
            s.add_child(shoulder.as_str(), "spine_03", at(x * 0.12 * sz, -0.05 * sz, 0.0))?;
            // 前肢肘部向后
            s.add_child(elbow.as_str(), &shoulder, at(0.0, -0.27 * sz, -0.02 * sz))?;
            s.add_child(wrist.as_str(), &elbow, at(0.0, -0.28 * sz, 0.02 * sz))?;
            s.add_child(format!("paw_f{side}"), &wrist, at(0.0, 0.0, 0.06 * sz))?;
        }

        for (side, x) in SIDES {
            let hip = format!("hip_h{side}");
            let knee = format!("knee_h{side}");
            let hock = format!("hock_h{side}");
            s.add_child(hip.as_str(), "pelvis", at(x * 0.12 * sz, -0.05 * sz, 0.0))?;
            s.add_child(knee.as_str(), &hip, at(0.0, -0.27 * sz, 0.03 * sz))?;
            s.add_child(hock.as_str(), &knee, at(0.0, -0.28 * sz, -0.03 * sz))?;
            s.add_child(format!("paw_h{side}"), &hock, at(0.0, 0.0, 0.06 * sz))?;
        }

        s.add_child("tail_01", "pelvis", at(0.0, 0.05 * sz, -0.12 * sz))?;
        s.add_child("tail_02", "tail_01", at(0.0, 0.0, -0.15 * sz))?;
        s.add_child("tail_03", "tail_02", at(0.0, 0.0, -0.15 * sz))?;

        Self::finish(s, Morphology::Quadruped)
    }

    /// 蛇形：N 节等长脊柱 + 头（spine_00 在最前方）
    pub fn serpentine(length: f32, segments: usize) -> Result<Skeleton> {
        let len = Self::check_size(length)?;
        let n = Self::check_segments(segments, 1)?;
        let seg = len / n as f32;
        let mut s = Skeleton::new();

        let mut parent = s.add_bone("spine_00", -1, at(0.0, 0.03 * len, 0.5 * len))?;
        for k in 1..n {
            parent = s.add_bone(format!("spine_{k:02}"), parent as i32, at(0.0, 0.0, -seg))?;
        }
        s.add_child("head", "spine_00", at(0.0, 0.0, seg))?;

        Self::finish(s, Morphology::Serpentine)
    }

    /// 飞行：身体/胸/颈/头，三节尾巴，双翼（肩/肘/腕/尖），退化的双腿
    pub fn flying(wingspan: f32) -> Result<Skeleton> {
        let w = Self::check_size(wingspan)?;
        let mut s = Skeleton::new();

        s.add_bone("body", -1, at(0.0, 0.3 * w, 0.0))?;
        s.add_child("chest", "body", at(0.0, 0.0, 0.1 * w))?;
        s.add_child("neck", "chest", at(0.0, 0.05 * w, 0.08 * w))?;
        s.add_child("head", "neck", at(0.0, 0.02 * w, 0.06 * w))?;
        s.add_child("tail_01", "body", at(0.0, 0.0, -0.08 * w))?;
        s.add_child("tail_02", "tail_01", at(0.0, 0.0, -0.08 * w))?;
        s.add_child("tail_03", "tail_02", at(0.0, 0.0, -0.08 * w))?;

        for (side, x) in SIDES {
            let shoulder = format!("wing_shoulder_{side}");
            let elbow = format!("wing_elbow_{side}");
            let wrist = format!("wing_wrist_{side}");
            s.add_child(shoulder.as_str(), "chest", at(x * 0.05 * w, 0.02 * w, 0.0))?;
            s.add_child(elbow.as_str(), &shoulder, at(x * 0.15 * w, 0.0, 0.0))?;
            s.add_child(wrist.as_str(), &elbow, at(x * 0.15 * w, 0.0, 0.0))?;
            s.add_child(format!("wing_tip_{side}"), &wrist, at(x * 0.15 * w, 0.0, 0.0))?;
        }

        for (side, x) in SIDES {
            let hip = format!("leg_hip_{side}");
            let knee = format!("leg_knee_{side}");
            let ankle = format!("leg_ankle_{side}");
            s.add_child(hip.as_str(), "body", at(x * 0.04 * w, -0.05 * w, 0.0))?;
            s.add_child(knee.as_str(), &hip, at(0.0, -0.12 * w, 0.02 * w))?;
            s.add_child(ankle.as_str(), &knee, at(0.0, -0.13 * w, -0.02 * w))?;
            s.add_child(format!("leg_foot_{side}"), &ankle, at(0.0, 0.0, 0.04 * w))?;
        }

        Self::finish(s, Morphology::Flying)
    }

    /// 水生：N 节身体、头、尾基与尾鳍、两片胸鳍、背鳍
    pub fn aquatic(length: f32, segments: usize) -> Result<Skeleton> {
        let len = Self::check_size(length)?;
        let n = Self::check_segments(segments, 6)?;
        let seg = 0.6 * len / n as f32;
        let mut s = Skeleton::new();

        let mut parent = s.add_bone("body_00", -1, at(0.0, 0.0, 0.2 * len))?;
        s.add_child("head", "body_00", at(0.0, 0.0, 0.15 * len))?;
        for k in 1..n {
            parent = s.add_bone(format!("body_{k:02}"), parent as i32, at(0.0, 0.0, -seg))?;
        }
        s.add_bone("tail_base", parent as i32, at(0.0, 0.0, -seg))?;
        s.add_child("tail_fin", "tail_base", at(0.0, 0.0, -0.1 * len))?;
        for (side, x) in SIDES {
            s.add_child(format!("pectoral_{side}"), "body_00", at(x * 0.06 * len, -0.03 * len, -0.03 * len))?;
        }
        let mid = format!("body_{:02}", n / 2);
        s.add_child("dorsal_fin", &mid, at(0.0, 0.08 * len, 0.0))?;

        Self::finish(s, Morphology::Aquatic)
    }

    // ========================================
    // 内部工具
    // ========================================

    fn check_size(size: f32) -> Result<f32> {
        if size.is_finite() && size > 0.0 {
            Ok(size)
        } else {
            Err(CreatureError::InvalidConfig(format!("creature size must be positive, got {size}")))
        }
    }

    /// `extra` 为除分段外的其余骨骼数
    fn check_segments(segments: usize, extra: usize) -> Result<usize> {
        if segments >= 2 && segments + extra <= MAX_BONES {
            Ok(segments)
        } else {
            Err(CreatureError::InvalidConfig(format!(
                "segment count {segments} must be in 2..={}",
                MAX_BONES - extra
            )))
        }
    }

    fn finish(mut s: Skeleton, morphology: Morphology) -> Result<Skeleton> {
        s.calculate_bone_lengths();
        log::debug!("[Skeleton] 生成 {:?} 骨架: {} 个骨骼", morphology, s.len());
        Ok(s)
    }
}

#[inline]
fn at(x: f32, y: f32, z: f32) -> BoneTransform {
    BoneTransform::from_translation(Vec3::new(x, y, z))
}
