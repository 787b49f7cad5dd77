//! 翅膀扇动

use std::f32::consts::TAU;

use glam::{Quat, Vec3};

use crate::pose::SkeletonPose;
use crate::skeleton::Skeleton;
use crate::Result;

/// 肘部折叠占振幅的比例
const ELBOW_FOLD: f32 = 0.3;
/// 腕部弯曲占振幅的比例
const WRIST_FLEX: f32 = 0.2;

/// 单侧翅膀配置
#[derive(Clone, Debug, PartialEq)]
pub struct WingConfig {
    pub shoulder: usize,
    pub elbow: usize,
    pub wrist: usize,
    pub tip: usize,
    /// 扇动振幅（度）
    pub amplitude_deg: f32,
    /// 扇动频率（Hz）
    pub flap_speed: f32,
    /// 相位偏移（弧度）
    pub phase_offset: f32,
    /// 左侧 +1，右侧 -1，使两侧同时上扬
    pub side: f32,
}

impl WingConfig {
    pub fn new(shoulder: usize, elbow: usize, wrist: usize, tip: usize, side: f32) -> Self {
        Self {
            shoulder,
            elbow,
            wrist,
            tip,
            amplitude_deg: 45.0,
            flap_speed: 3.0,
            phase_offset: 0.0,
            side: if side < 0.0 { -1.0 } else { 1.0 },
        }
    }

    /// 按骨骼名称查找
    pub fn from_names(skeleton: &Skeleton, names: [&str; 4], side: f32) -> Result<Self> {
        Ok(Self::new(
            skeleton.require_bone(names[0])?,
            skeleton.require_bone(names[1])?,
            skeleton.require_bone(names[2])?,
            skeleton.require_bone(names[3])?,
            side,
        ))
    }

    pub fn with_flap(mut self, amplitude_deg: f32, flap_speed: f32) -> Self {
        self.amplitude_deg = amplitude_deg;
        self.flap_speed = flap_speed;
        self
    }

    /// 时间 `t` 处的扇动相位
    #[inline]
    pub fn phase(&self, t: f32) -> f32 {
        t * self.flap_speed * TAU + self.phase_offset
    }

    /// 把扇动旋转左乘到肩、肘、腕的本地旋转上
    ///
    /// 旋转轴为身体前向 (+Z)，`weight` 为 0 时不修改姿势。
    pub fn apply(&self, t: f32, weight: f32, pose: &mut SkeletonPose) {
        if weight <= 0.0 {
            return;
        }
        let amplitude = self.amplitude_deg.to_radians() * weight * self.side;
        let phase = self.phase(t);
        let joints = [
            (self.shoulder, phase.sin() * amplitude),
            (self.elbow, (phase + 0.5).sin() * amplitude * ELBOW_FOLD),
            (self.wrist, (phase + 1.0).sin() * amplitude * WRIST_FLEX),
        ];
        for (bone, angle) in joints {
            if let Some(local) = pose.local_mut(bone) {
                local.rotation = (Quat::from_axis_angle(Vec3::Z, angle) * local.rotation).normalize();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::SkeletonFactory;

    fn wings(s: &Skeleton) -> (WingConfig, WingConfig) {
        let l = WingConfig::from_names(s, ["wing_shoulder_l", "wing_elbow_l", "wing_wrist_l", "wing_tip_l"], 1.0)
            .unwrap();
        let r = WingConfig::from_names(s, ["wing_shoulder_r", "wing_elbow_r", "wing_wrist_r", "wing_tip_r"], -1.0)
            .unwrap();
        (l, r)
    }

    #[test]
    fn test_flap_peak_and_mirror() {
        let s = SkeletonFactory::flying(2.0).unwrap();
        let (l, r) = wings(&s);
        let mut pose = SkeletonPose::from_skeleton(&s);
        // sin(phase) = 1
        let t = 0.25 / l.flap_speed;
        l.apply(t, 1.0, &mut pose);
        r.apply(t, 1.0, &mut pose);

        let (axis, angle) = pose.local(l.shoulder).unwrap().rotation.to_axis_angle();
        assert!((angle - 45f32.to_radians()).abs() < 1e-4);
        assert!(axis.abs_diff_eq(Vec3::Z, 1e-4));

        pose.calculate_global_transforms(&s);
        let lt = pose.global_position(l.tip);
        let rt = pose.global_position(r.tip);
        // 两侧翼尖同时上扬
        assert!(lt.y > s.bind_position(l.tip).y);
        assert!((lt.y - rt.y).abs() < 1e-4);
        assert!((lt.x + rt.x).abs() < 1e-4);
    }

    #[test]
    fn test_zero_weight_is_noop() {
        let s = SkeletonFactory::flying(2.0).unwrap();
        let (l, _) = wings(&s);
        let mut pose = SkeletonPose::from_skeleton(&s);
        let before = pose.locals().to_vec();
        l.apply(0.3, 0.0, &mut pose);
        assert_eq!(pose.locals(), before.as_slice());
    }

    #[test]
    fn test_elbow_and_wrist_scaled() {
        let s = SkeletonFactory::flying(2.0).unwrap();
        let (l, _) = wings(&s);
        let mut pose = SkeletonPose::from_skeleton(&s);
        let t = 0.1;
        l.apply(t, 0.5, &mut pose);
        let amp = 45f32.to_radians() * 0.5;
        let phase = l.phase(t);
        let elbow = pose.local(l.elbow).unwrap().rotation;
        let expected = Quat::from_rotation_z((phase + 0.5).sin() * amp * ELBOW_FOLD);
        assert!(elbow.dot(expected).abs() > 1.0 - 1e-5);
        let wrist = pose.local(l.wrist).unwrap().rotation;
        let expected = Quat::from_rotation_z((phase + 1.0).sin() * amp * WRIST_FLEX);
        assert!(wrist.dot(expected).abs() > 1.0 - 1e-5);
    }
}
