//! 游泳身体波
//!
//! 身体位置 p ∈ [0, 1]（0 = 头，1 = 尾）决定波幅：游泳方式给出空间遮罩，
//! 头/中/尾三段刚度经 smoothstep 混合后再调制一次。
//! 尾鳍、背鳍各自振荡，胸鳍作为舵面跟随转向信号偏转。

use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, TAU};

use glam::{Quat, Vec3};
use rand::Rng;

use crate::pose::SkeletonPose;

/// 游泳方式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SwimStyle {
    /// 鲹科式：波幅随 p^1.5 增长
    #[default]
    Carangiform,
    /// 鳗鲡式：全身均匀
    Anguilliform,
    /// 亚鲹科式：前三分之一不动，之后线性增长
    Subcarangiform,
    /// 鲔科式：只有后 30% 摆动
    Thunniform,
    /// 鳍划式：身体基本不动
    Labriform,
}

impl SwimStyle {
    /// 身体位置 p 处的相对波幅
    pub fn amplitude(self, p: f32) -> f32 {
        let p = p.clamp(0.0, 1.0);
        match self {
            SwimStyle::Carangiform => p.powf(1.5),
            SwimStyle::Anguilliform => 1.0,
            SwimStyle::Subcarangiform => {
                if p < 0.33 {
                    0.0
                } else {
                    (p - 0.33) / 0.67
                }
            }
            SwimStyle::Thunniform => {
                if p <= 0.7 {
                    0.0
                } else {
                    ((p - 0.7) / 0.3).powi(2)
                }
            }
            SwimStyle::Labriform => 0.2,
        }
    }
}

#[inline]
fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

// ============================================================================
// 配置
// ============================================================================

/// 游泳配置
#[derive(Clone, Debug, PartialEq)]
pub struct SwimConfig {
    /// 从头到尾的身体骨骼
    pub body: Vec<usize>,
    pub style: SwimStyle,
    /// 身体波最大幅度（弧度）
    pub body_wave_amplitude: f32,
    /// 身体波频率（周期/秒，速度系数为 1 时）
    pub body_wave_speed: f32,
    /// 身体上同时存在的波数
    pub body_wave_count: f32,
    pub head_stiffness: f32,
    pub mid_stiffness: f32,
    pub tail_stiffness: f32,
    /// 每段相位抖动（弧度）
    pub segment_jitter: Vec<f32>,
    /// 速度系数为 1 时的速度
    pub reference_speed: f32,
    pub tail_fin: Option<usize>,
    pub tail_fin_amplitude: f32,
    pub dorsal_fin: Option<usize>,
    pub dorsal_fin_amplitude: f32,
    /// (骨骼, 侧向符号)
    pub pectoral_fins: Vec<(usize, f32)>,
    pub pectoral_amplitude: f32,
    /// 转向信号到胸鳍偏转的增益（弧度）
    pub rudder_gain: f32,
}

impl SwimConfig {
    /// 最大相位抖动（弧度）
    pub const MAX_JITTER: f32 = 0.15;

    /// 创建配置，每段相位抖动由 `rng` 生成
    pub fn new(body: Vec<usize>, style: SwimStyle, rng: &mut impl Rng) -> Self {
        let segment_jitter = body
            .iter()
            .map(|_| rng.random_range(-Self::MAX_JITTER..=Self::MAX_JITTER))
            .collect();
        Self {
            body,
            style,
            body_wave_amplitude: 0.35,
            body_wave_speed: 1.5,
            body_wave_count: 1.0,
            head_stiffness: 0.8,
            mid_stiffness: 0.4,
            tail_stiffness: 0.1,
            segment_jitter,
            reference_speed: 2.0,
            tail_fin: None,
            tail_fin_amplitude: 0.5,
            dorsal_fin: None,
            dorsal_fin_amplitude: 0.15,
            pectoral_fins: Vec::new(),
            pectoral_amplitude: 0.25,
            rudder_gain: 0.5,
        }
    }

    /// 身体位置 p 处的柔韧度 = 1 − 刚度
    pub fn flexibility(&self, p: f32) -> f32 {
        let p = p.clamp(0.0, 1.0);
        let stiffness = if p < 0.5 {
            let t = smoothstep(0.0, 0.5, p);
            self.head_stiffness + (self.mid_stiffness - self.head_stiffness) * t
        } else {
            let t = smoothstep(0.5, 1.0, p);
            self.mid_stiffness + (self.tail_stiffness - self.mid_stiffness) * t
        };
        (1.0 - stiffness).clamp(0.0, 1.0)
    }

    /// 第 k 段的身体位置 p
    #[inline]
    pub fn body_position(&self, k: usize) -> f32 {
        let n = self.body.len();
        if n <= 1 {
            1.0
        } else {
            k as f32 / (n - 1) as f32
        }
    }
}

// ============================================================================
// 游泳动画器
// ============================================================================

/// 游泳动画器：保存波相位与转向信号
#[derive(Clone, Debug)]
pub struct SwimAnimator {
    config: SwimConfig,
    /// 波相位（周期，[0, 1)）
    phase: f32,
    speed_factor: f32,
    /// 转向信号 [-1, 1]，正值为左转
    turn: f32,
    heading: Option<Vec3>,
}

impl SwimAnimator {
    /// 转向信号的平滑速率（1/秒）
    const TURN_SMOOTHING: f32 = 6.0;
    /// 角速度达到此值（弧度/秒）时转向信号饱和
    const FULL_TURN_RATE: f32 = 2.0;

    pub fn new(config: SwimConfig) -> Self {
        Self {
            config,
            phase: 0.0,
            speed_factor: 0.0,
            turn: 0.0,
            heading: None,
        }
    }

    #[inline]
    pub fn config(&self) -> &SwimConfig {
        &self.config
    }

    #[inline]
    pub fn config_mut(&mut self) -> &mut SwimConfig {
        &mut self.config
    }

    #[inline]
    pub fn phase(&self) -> f32 {
        self.phase
    }

    #[inline]
    pub fn turn_signal(&self) -> f32 {
        self.turn
    }

    #[inline]
    pub fn speed_factor(&self) -> f32 {
        self.speed_factor
    }

    /// 推进相位，从速度方向的变化提取转向信号
    pub fn update(&mut self, dt: f32, velocity: Vec3) {
        let speed = velocity.length();
        self.speed_factor = (speed / self.config.reference_speed.max(1e-3)).clamp(0.0, 1.0);
        self.phase = (self.phase + self.config.body_wave_speed * self.speed_factor * dt).rem_euclid(1.0);

        let flat = Vec3::new(velocity.x, 0.0, velocity.z).normalize_or_zero();
        let mut raw_turn = 0.0;
        if flat != Vec3::ZERO {
            if let (Some(prev), true) = (self.heading, dt > 0.0) {
                // 绕 +Y 的有符号角度
                let angle = prev.cross(flat).y.atan2(prev.dot(flat));
                raw_turn = (angle / dt / Self::FULL_TURN_RATE).clamp(-1.0, 1.0);
            }
            self.heading = Some(flat);
        }
        let k = 1.0 - (-Self::TURN_SMOOTHING * dt).exp();
        self.turn += (raw_turn - self.turn) * k;
    }

    /// 把身体波和鳍的旋转左乘到本地旋转上，`weight` 调制全部幅度
    pub fn apply(&self, weight: f32, pose: &mut SkeletonPose) {
        let cfg = &self.config;
        let amplitude = cfg.body_wave_amplitude * self.speed_factor * weight;
        let wave = self.phase * TAU;

        if amplitude > 0.0 {
            for (k, &bone) in cfg.body.iter().enumerate() {
                let p = cfg.body_position(k);
                let jitter = cfg.segment_jitter.get(k).copied().unwrap_or(0.0);
                let local_phase = wave - p * cfg.body_wave_count * TAU + jitter;
                let yaw = local_phase.sin() * amplitude * cfg.style.amplitude(p) * cfg.flexibility(p);
                rotate_local(pose, bone, Quat::from_rotation_y(yaw));
            }
        }

        let fin_scale = self.speed_factor * weight;
        if let Some(tail) = cfg.tail_fin {
            let phase = wave - cfg.body_wave_count * TAU - FRAC_PI_4;
            rotate_local(pose, tail, Quat::from_rotation_y(phase.sin() * cfg.tail_fin_amplitude * fin_scale));
        }
        if let Some(dorsal) = cfg.dorsal_fin {
            let phase = wave + FRAC_PI_2;
            rotate_local(pose, dorsal, Quat::from_rotation_z(phase.sin() * cfg.dorsal_fin_amplitude * fin_scale));
        }
        for &(fin, side) in &cfg.pectoral_fins {
            let flutter = (wave * 2.0).sin() * cfg.pectoral_amplitude * 0.3 * fin_scale;
            let rudder = self.turn * cfg.rudder_gain * side * weight;
            rotate_local(pose, fin, Quat::from_rotation_y(rudder + flutter));
        }
    }
}

#[inline]
fn rotate_local(pose: &mut SkeletonPose, bone: usize, delta: Quat) {
    if let Some(local) = pose.local_mut(bone) {
        local.rotation = (delta * local.rotation).normalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::SkeletonFactory;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_style_masks() {
        assert!((SwimStyle::Carangiform.amplitude(0.25) - 0.125).abs() < 1e-6);
        assert_eq!(SwimStyle::Anguilliform.amplitude(0.1), 1.0);
        assert_eq!(SwimStyle::Subcarangiform.amplitude(0.2), 0.0);
        assert!((SwimStyle::Subcarangiform.amplitude(1.0) - 1.0).abs() < 1e-6);
        assert_eq!(SwimStyle::Thunniform.amplitude(0.6), 0.0);
        assert!((SwimStyle::Thunniform.amplitude(0.85) - 0.25).abs() < 1e-5);
        assert_eq!(SwimStyle::Labriform.amplitude(0.9), 0.2);
    }

    #[test]
    fn test_flexibility_blend() {
        let mut rng = StdRng::seed_from_u64(1);
        let cfg = SwimConfig::new(vec![0, 1, 2], SwimStyle::Carangiform, &mut rng);
        assert!((cfg.flexibility(0.0) - 0.2).abs() < 1e-6);
        assert!((cfg.flexibility(0.5) - 0.6).abs() < 1e-6);
        assert!((cfg.flexibility(1.0) - 0.9).abs() < 1e-6);
        let samples: Vec<f32> = (0..=10).map(|i| cfg.flexibility(i as f32 / 10.0)).collect();
        assert!(samples.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn test_jitter_is_seeded() {
        let body: Vec<usize> = (0..8).collect();
        let a = SwimConfig::new(body.clone(), SwimStyle::Anguilliform, &mut StdRng::seed_from_u64(42));
        let b = SwimConfig::new(body.clone(), SwimStyle::Anguilliform, &mut StdRng::seed_from_u64(42));
        let c = SwimConfig::new(body, SwimStyle::Anguilliform, &mut StdRng::seed_from_u64(7));
        assert_eq!(a.segment_jitter, b.segment_jitter);
        assert_ne!(a.segment_jitter, c.segment_jitter);
        assert!(a.segment_jitter.iter().all(|j| j.abs() <= SwimConfig::MAX_JITTER));
    }

    #[test]
    fn test_phase_advance_scales_with_speed() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut swim = SwimAnimator::new(SwimConfig::new(vec![0, 1], SwimStyle::Carangiform, &mut rng));
        swim.update(0.5, Vec3::ZERO);
        assert_eq!(swim.phase(), 0.0);
        // 速度系数 0.5：0.1 秒推进 1.5 × 0.5 × 0.1
        swim.update(0.1, Vec3::new(0.0, 0.0, 1.0));
        assert!((swim.phase() - 0.075).abs() < 1e-6);
    }

    #[test]
    fn test_tail_moves_more_than_head() {
        let s = SkeletonFactory::aquatic(1.0, 8).unwrap();
        let body: Vec<usize> = (0..8).map(|k| s.find_bone(&format!("body_{k:02}")).unwrap()).collect();
        let mut rng = StdRng::seed_from_u64(11);
        let mut cfg = SwimConfig::new(body.clone(), SwimStyle::Carangiform, &mut rng);
        cfg.segment_jitter.iter_mut().for_each(|j| *j = 0.0);
        let mut swim = SwimAnimator::new(cfg);

        let mut head_max = 0.0f32;
        let mut tail_max = 0.0f32;
        for _ in 0..120 {
            swim.update(1.0 / 60.0, Vec3::new(0.0, 0.0, 2.0));
            let mut pose = SkeletonPose::from_skeleton(&s);
            swim.apply(1.0, &mut pose);
            head_max = head_max.max(pose.local(body[0]).unwrap().rotation.to_axis_angle().1);
            tail_max = tail_max.max(pose.local(body[7]).unwrap().rotation.to_axis_angle().1);
        }
        assert!(head_max < 1e-4);
        assert!(tail_max > 0.1);
    }

    #[test]
    fn test_turn_signal_biases_pectorals() {
        let s = SkeletonFactory::aquatic(1.0, 8).unwrap();
        let left = s.find_bone("pectoral_l").unwrap();
        let right = s.find_bone("pectoral_r").unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let mut cfg = SwimConfig::new(vec![0], SwimStyle::Labriform, &mut rng);
        cfg.pectoral_fins = vec![(left, 1.0), (right, -1.0)];
        cfg.pectoral_amplitude = 0.0;
        let mut swim = SwimAnimator::new(cfg);

        // 向左转：速度方向从 +Z 逐渐转向 +X
        let dt = 1.0 / 60.0;
        for i in 0..30 {
            let a = i as f32 * 0.02;
            swim.update(dt, Vec3::new(a.sin(), 0.0, a.cos()) * 2.0);
        }
        assert!(swim.turn_signal() > 0.1);

        let mut pose = SkeletonPose::from_skeleton(&s);
        swim.apply(1.0, &mut pose);
        let (_, yl, _) = pose.local(left).unwrap().rotation.to_euler(glam::EulerRot::XYZ);
        let (_, yr, _) = pose.local(right).unwrap().rotation.to_euler(glam::EulerRot::XYZ);
        assert!(yl > 0.0 && yr < 0.0);
    }
}
