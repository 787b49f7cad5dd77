//! 脊柱波动（蛇形、尾巴）

use glam::Quat;

use crate::pose::SkeletonPose;
use crate::skeleton::Skeleton;
use crate::Result;

/// 俯仰分量占偏航幅度的比例
const PITCH_RATIO: f32 = 0.3;

/// 脊柱波动配置
#[derive(Clone, Debug, PartialEq)]
pub struct SpineConfig {
    /// 从颈部到尾尖的骨骼
    pub bones: Vec<usize>,
    /// 波幅（弧度，每单位速度）
    pub wave_magnitude: f32,
    /// 相邻分段之间的相位差（弧度）
    pub per_segment_phase: f32,
    /// 时间相位速度（弧度/秒）
    pub wave_speed: f32,
    /// 整体相位偏移（弧度）
    pub phase_offset: f32,
}

impl SpineConfig {
    pub fn new(bones: Vec<usize>) -> Self {
        Self {
            bones,
            wave_magnitude: 0.15,
            per_segment_phase: 0.6,
            wave_speed: 4.0,
            phase_offset: 0.0,
        }
    }

    /// 沿父子链从 `start` 到 `end` 收集骨骼
    pub fn from_chain(skeleton: &Skeleton, start: &str, end: &str) -> Result<Self> {
        let s = skeleton.require_bone(start)?;
        let e = skeleton.require_bone(end)?;
        let bones = skeleton.chain_between(s, e).ok_or_else(|| {
            crate::CreatureError::InvalidConfig(format!("'{start}' is not an ancestor of '{end}'"))
        })?;
        Ok(Self::new(bones))
    }

    /// 第 `k` 段在时间 `t` 的相位
    #[inline]
    pub fn segment_phase(&self, t: f32, k: usize) -> f32 {
        t * self.wave_speed + self.phase_offset + k as f32 * self.per_segment_phase
    }

    /// 偏航（绕 Y）与俯仰（绕 X）左乘到每段本地旋转上，幅度与速度成正比
    pub fn apply(&self, t: f32, speed: f32, pose: &mut SkeletonPose) {
        let scale = self.wave_magnitude * speed;
        if scale.abs() < 1e-6 {
            return;
        }
        for (k, &bone) in self.bones.iter().enumerate() {
            let phase = self.segment_phase(t, k);
            let yaw = phase.sin() * scale;
            let pitch = (phase * 0.5).sin() * scale * PITCH_RATIO;
            if let Some(local) = pose.local_mut(bone) {
                let delta = Quat::from_rotation_y(yaw) * Quat::from_rotation_x(pitch);
                local.rotation = (delta * local.rotation).normalize();
            }
        }
    }
}
