//! 程序化运动驱动
//!
//! 把身体速度转换为姿势增量：步态相位 → 每只脚的摆动/支撑 → 落脚目标，
//! 身体起伏/摇摆/俯仰，以及翅膀、脊柱、游泳振荡器。
//! 落脚目标在世界空间计算，送入 IK 前转换到模型空间。

mod foot;
mod gait;
mod ground;

pub use foot::{FootConfig, FootPlacement};
pub use gait::{GaitClock, GaitTiming, GaitType, MAX_CYCLE, MIN_CYCLE, STILL_SPEED};
pub use ground::{FlatGround, GroundHit, GroundProbe};

use std::f32::consts::TAU;

use glam::{Quat, Vec3};

use self::foot::{FootState, StepContext};
use crate::animator::AnimatorConfig;
use crate::ik::{ChainSolver, IkSystem, IkTarget, PoleVector};
use crate::oscillator::{SpineConfig, SwimAnimator, SwimConfig, WingConfig};
use crate::pose::SkeletonPose;
use crate::skeleton::Skeleton;
use crate::{CreatureError, Result};

/// 运动驱动器
pub struct LocomotionDriver {
    config: AnimatorConfig,

    // ========== 配置 ==========
    feet: Vec<FootConfig>,
    foot_states: Vec<FootState>,
    wings: Vec<WingConfig>,
    spine: Option<SpineConfig>,
    swim: Option<SwimAnimator>,
    ground: Box<dyn GroundProbe + Send>,

    // ========== 步态 ==========
    gait: GaitType,
    timing: GaitTiming,
    clock: GaitClock,

    // ========== 身体状态 ==========
    body_position: Vec3,
    body_rotation: Quat,
    velocity: Vec3,
    angular_velocity: Vec3,
    prev_velocity: Option<Vec3>,

    // ========== 输出 ==========
    /// 身体空间的根骨骼平移偏移
    body_offset: Vec3,
    /// 绕身体右轴的俯仰（弧度，正值前倾）
    body_pitch: f32,
    /// clamp(|v| / speed_normalization, 0, 1)，静止时为 0
    speed_factor: f32,

    // ========== 混合权重 ==========
    leg_weight: f32,
    swim_weight: f32,
    wing_weight: f32,
    /// 两栖混合中：腿部始终按 `leg_weight` 参与 IK，不受步态标签影响
    blended_legs: bool,
}

impl std::fmt::Debug for LocomotionDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocomotionDriver")
            .field("feet", &self.feet.len())
            .field("wings", &self.wings.len())
            .field("gait", &self.gait)
            .field("phase", &self.clock.phase())
            .field("body_position", &self.body_position)
            .field("velocity", &self.velocity)
            .finish_non_exhaustive()
    }
}

impl LocomotionDriver {
    pub fn new(config: AnimatorConfig) -> Self {
        Self {
            config,
            feet: Vec::new(),
            foot_states: Vec::new(),
            wings: Vec::new(),
            spine: None,
            swim: None,
            ground: Box::new(FlatGround::default()),
            gait: GaitType::Walk,
            timing: GaitTiming::default(),
            clock: GaitClock::new(),
            body_position: Vec3::ZERO,
            body_rotation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            prev_velocity: None,
            body_offset: Vec3::ZERO,
            body_pitch: 0.0,
            speed_factor: 0.0,
            leg_weight: 1.0,
            swim_weight: 1.0,
            wing_weight: 0.0,
            blended_legs: false,
        }
    }

    // ========================================
    // 配置
    // ========================================

    /// 添加一条腿，返回脚索引；步态时序按新的脚数量重新生成
    pub fn add_foot(&mut self, foot: FootConfig) -> usize {
        self.feet.push(foot);
        self.foot_states.push(FootState::default());
        if self.gait != GaitType::Custom {
            self.timing = GaitTiming::preset(self.foot_gait(), self.feet.len());
        }
        self.feet.len() - 1
    }

    pub fn add_wing(&mut self, wing: WingConfig) {
        self.wings.push(wing);
    }

    pub fn set_spine(&mut self, spine: Option<SpineConfig>) {
        self.spine = spine;
    }

    pub fn set_swim(&mut self, swim: Option<SwimConfig>) {
        self.swim = swim.map(SwimAnimator::new);
    }

    /// 为每条腿在 IK 系统中注册两骨骼链（髋 → 膝 → 踝）
    pub fn register_leg_chains(&mut self, skeleton: &Skeleton, ik: &mut IkSystem) -> Result<()> {
        for (cfg, state) in self.feet.iter().zip(&mut self.foot_states) {
            if state.chain.is_some() {
                continue;
            }
            let handle = ik.add_chain(
                skeleton,
                cfg.hip,
                cfg.ankle,
                ChainSolver::TwoBone,
                self.config.leg_chain_priority,
            )?;
            let knee = ik.chain(handle).map(|c| c.bones[1]);
            if knee != Some(cfg.knee) {
                ik.remove_chain(handle)?;
                return Err(CreatureError::InvalidConfig(format!(
                    "knee {} is not between hip {} and ankle {}",
                    cfg.knee, cfg.hip, cfg.ankle
                )));
            }
            state.chain = Some(handle);
        }
        Ok(())
    }

    /// 设置地面探测函数
    pub fn set_ground_probe(&mut self, probe: impl GroundProbe + Send + 'static) {
        self.ground = Box::new(probe);
    }

    /// 恢复为 y = 0 的平地
    pub fn clear_ground_probe(&mut self) {
        self.ground = Box::new(FlatGround::default());
    }

    /// 切换步态，非 Custom 步态使用预设时序
    pub fn set_gait(&mut self, gait: GaitType) {
        if gait != self.gait {
            log::debug!("[Locomotion] 步态 {:?} → {:?}", self.gait, gait);
        }
        self.gait = gait;
        if gait != GaitType::Custom {
            self.timing = GaitTiming::preset(self.foot_gait(), self.feet.len());
        }
    }

    /// 脚的节奏所用的步态：混合腿部时，不着地的步态沿用行走时序
    fn foot_gait(&self) -> GaitType {
        if self.blended_legs && !self.gait.uses_legs() {
            GaitType::Walk
        } else {
            self.gait
        }
    }

    /// 开启后腿部 IK 权重只由 [`set_leg_weight`](Self::set_leg_weight) 决定
    pub fn set_blended_legs(&mut self, enabled: bool) {
        if self.blended_legs == enabled {
            return;
        }
        self.blended_legs = enabled;
        if self.gait != GaitType::Custom {
            self.timing = GaitTiming::preset(self.foot_gait(), self.feet.len());
        }
    }

    #[inline]
    pub fn blended_legs(&self) -> bool {
        self.blended_legs
    }

    /// 使用自定义时序，步态切换为 Custom
    pub fn set_timing(&mut self, timing: GaitTiming) {
        self.gait = GaitType::Custom;
        self.timing = timing;
    }

    pub fn set_config(&mut self, config: AnimatorConfig) {
        self.config = config;
    }

    /// 腿部 IK 权重（两栖混合）
    pub fn set_leg_weight(&mut self, weight: f32) {
        self.leg_weight = weight.clamp(0.0, 1.0);
    }

    /// 游泳波幅权重（两栖混合）
    pub fn set_swim_weight(&mut self, weight: f32) {
        self.swim_weight = weight.clamp(0.0, 1.0);
    }

    // ========================================
    // 身体状态
    // ========================================

    pub fn set_body_state(&mut self, position: Vec3, rotation: Quat, velocity: Vec3, angular_velocity: Vec3) {
        self.body_position = position;
        self.body_rotation = rotation.normalize();
        self.velocity = velocity;
        self.angular_velocity = angular_velocity;
    }

    /// 清空相位和落脚状态（瞬移后调用）
    pub fn reset(&mut self) {
        self.clock.reset();
        self.prev_velocity = None;
        self.body_offset = Vec3::ZERO;
        self.body_pitch = 0.0;
        self.speed_factor = 0.0;
        for state in &mut self.foot_states {
            state.reset();
        }
    }

    // ========================================
    // 访问器
    // ========================================

    #[inline]
    pub fn gait(&self) -> GaitType {
        self.gait
    }

    #[inline]
    pub fn timing(&self) -> &GaitTiming {
        &self.timing
    }

    #[inline]
    pub fn phase(&self) -> f32 {
        self.clock.phase()
    }

    #[inline]
    pub fn elapsed(&self) -> f32 {
        self.clock.elapsed()
    }

    #[inline]
    pub fn is_still(&self) -> bool {
        self.clock.is_still()
    }

    #[inline]
    pub fn feet(&self) -> &[FootConfig] {
        &self.feet
    }

    #[inline]
    pub fn foot_placement(&self, foot: usize) -> Option<&FootPlacement> {
        self.foot_states.get(foot).map(|s| &s.placement)
    }

    pub fn foot_placements(&self) -> impl Iterator<Item = &FootPlacement> + '_ {
        self.foot_states.iter().map(|s| &s.placement)
    }

    #[inline]
    pub fn wings(&self) -> &[WingConfig] {
        &self.wings
    }

    #[inline]
    pub fn spine(&self) -> Option<&SpineConfig> {
        self.spine.as_ref()
    }

    #[inline]
    pub fn swim(&self) -> Option<&SwimAnimator> {
        self.swim.as_ref()
    }

    #[inline]
    pub fn body_position(&self) -> Vec3 {
        self.body_position
    }

    #[inline]
    pub fn body_rotation(&self) -> Quat {
        self.body_rotation
    }

    #[inline]
    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    #[inline]
    pub fn angular_velocity(&self) -> Vec3 {
        self.angular_velocity
    }

    /// 身体空间的根骨骼偏移（x 摇摆，y 起伏）
    #[inline]
    pub fn body_offset(&self) -> Vec3 {
        self.body_offset
    }

    #[inline]
    pub fn body_pitch(&self) -> f32 {
        self.body_pitch
    }

    #[inline]
    pub fn speed_factor(&self) -> f32 {
        self.speed_factor
    }

    #[inline]
    pub fn leg_weight(&self) -> f32 {
        self.leg_weight
    }

    #[inline]
    pub fn swim_weight(&self) -> f32 {
        self.swim_weight
    }

    #[inline]
    pub fn wing_weight(&self) -> f32 {
        self.wing_weight
    }

    /// 世界坐标转换到模型空间
    #[inline]
    pub fn world_to_model(&self, point: Vec3) -> Vec3 {
        self.body_rotation.inverse() * (point - self.body_position)
    }

    /// 身体前向（世界空间）
    #[inline]
    pub fn forward(&self) -> Vec3 {
        self.body_rotation * Vec3::Z
    }

    // ========================================
    // 每帧更新
    // ========================================

    /// 推进相位，计算落脚点与身体运动，并把翅膀、脊柱、游泳振荡写入姿势
    pub fn update(&mut self, dt: f32, skeleton: &Skeleton, pose: &mut SkeletonPose) {
        if !dt.is_finite() || dt < 0.0 {
            log::warn!("[Locomotion] 忽略无效的时间步长 {dt}");
            return;
        }
        if pose.len() != skeleton.len() {
            log::warn!("[Locomotion] 姿势与骨架不匹配，跳过本帧");
            return;
        }

        let speed = self.velocity.length();
        let moving = self.clock.advance(dt, speed, &self.timing);
        let phase = self.clock.phase();

        // ====== 身体运动 ======
        let accel = match self.prev_velocity {
            Some(prev) if dt > 0.0 => (self.velocity - prev) / dt,
            _ => Vec3::ZERO,
        };
        self.prev_velocity = Some(self.velocity);

        let speed_factor = if moving {
            (speed / self.config.speed_normalization).clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.speed_factor = speed_factor;
        let bob_frequency = if self.feet.len() == 2 { 2.0 } else { 1.0 };
        let bob = (TAU * phase * bob_frequency).sin() * self.config.bob_amplitude * speed_factor;
        let sway = (TAU * phase).sin() * self.config.sway_amplitude * speed_factor;
        self.body_offset = Vec3::new(sway, bob, 0.0);
        let limit = self.config.pitch_limit;
        self.body_pitch = (accel.dot(self.forward()) * self.config.pitch_gain).clamp(-limit, limit);

        // ====== 脚 ======
        let horizontal = Vec3::new(self.velocity.x, 0.0, self.velocity.z);
        let flat_forward = {
            let f = self.forward();
            Vec3::new(f.x, 0.0, f.z).normalize_or_zero()
        };
        let stride_dir = if horizontal.length_squared() > STILL_SPEED * STILL_SPEED {
            horizontal.normalize()
        } else if flat_forward != Vec3::ZERO {
            flat_forward
        } else {
            Vec3::Z
        };
        let foot_weight = if self.gait.uses_legs() || self.blended_legs {
            self.leg_weight
        } else {
            0.0
        };

        for (i, (cfg, state)) in self.feet.iter().zip(&mut self.foot_states).enumerate() {
            let ctx = StepContext {
                body_position: self.body_position,
                body_rotation: self.body_rotation,
                stride_dir,
                foot_phase: self.clock.foot_phase(self.timing.offset(i) + cfg.phase_offset),
                duty_factor: self.timing.duty_factor,
                still: !moving,
                dt,
                settle_rate: self.config.foot_settle_rate,
                weight: foot_weight,
                probe: self.ground.as_ref(),
                probe_height: self.config.ground_probe_height,
                probe_distance: self.config.ground_probe_distance,
            };
            state.update(cfg, &ctx);
        }

        // ====== 翅膀 ======
        let wing_goal = if self.gait.flaps_wings() { 1.0 } else { 0.0 };
        let k = 1.0 - (-self.config.wing_blend_rate * dt).exp();
        self.wing_weight += (wing_goal - self.wing_weight) * k;
        let t = self.clock.elapsed();
        for wing in &self.wings {
            wing.apply(t, self.wing_weight, pose);
        }

        // ====== 脊柱 / 游泳 ======
        if let Some(spine) = &self.spine {
            spine.apply(t, speed, pose);
        }
        if let Some(swim) = &mut self.swim {
            swim.update(dt, self.velocity);
            swim.apply(self.swim_weight, pose);
        }

        if self.config.debug_log {
            log::debug!(
                "[Locomotion] t={t:.3} phase={phase:.3} speed={speed:.3} offset={} pitch={:.3}",
                self.body_offset,
                self.body_pitch
            );
        }
    }

    /// 施加身体偏移，设置腿部 IK 目标并求解，最后让着地的脚贴合地面
    pub fn apply_to_pose(&self, skeleton: &Skeleton, pose: &mut SkeletonPose, ik: &mut IkSystem) {
        if pose.len() != skeleton.len() {
            return;
        }

        // 身体偏移作用在根骨骼上
        let pitch = Quat::from_rotation_x(self.body_pitch);
        for root in skeleton.roots() {
            if let Some(local) = pose.local_mut(root) {
                local.translation += self.body_offset;
                local.rotation = (pitch * local.rotation).normalize();
            }
        }
        pose.calculate_global_transforms(skeleton);

        // 腿部 IK 目标（模型空间）
        for (cfg, state) in self.feet.iter().zip(&self.foot_states) {
            let Some(handle) = state.chain else {
                continue;
            };
            let placement = &state.placement;
            let target = IkTarget::at(self.world_to_model(placement.target)).with_weight(placement.weight);
            let pole = cfg.knee_pole.map(|p| PoleVector::new(p, 1.0));
            if ik.set_target(handle, target).and(ik.set_pole(handle, pole)).is_err() {
                log::trace!("[Locomotion] 腿部链句柄已失效: {handle:?}");
            }
        }
        ik.solve(skeleton, pose);

        if self.config.align_feet_to_ground {
            self.align_feet(skeleton, pose);
        }
    }

    /// 着地的脚：踝关节上方向转向地面法线
    fn align_feet(&self, skeleton: &Skeleton, pose: &mut SkeletonPose) {
        let inverse = self.body_rotation.inverse();
        for (cfg, state) in self.feet.iter().zip(&self.foot_states) {
            let placement = &state.placement;
            if !placement.grounded || placement.weight <= 0.0 {
                continue;
            }
            let normal = (inverse * placement.normal).normalize_or_zero();
            let up = pose.global_rotation(cfg.ankle) * Vec3::Y;
            if normal == Vec3::ZERO {
                continue;
            }
            let delta = Quat::IDENTITY.slerp(Quat::from_rotation_arc(up.normalize(), normal), placement.weight);
            pose.rotate_global(skeleton, cfg.ankle, delta);
            pose.calculate_global_transforms_from(skeleton, cfg.ankle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::SkeletonFactory;

    fn biped_driver() -> (Skeleton, LocomotionDriver, IkSystem) {
        let s = SkeletonFactory::biped(1.0).unwrap();
        let mut driver = LocomotionDriver::new(AnimatorConfig::default());
        for side in ["l", "r"] {
            let foot = FootConfig::from_names(
                &s,
                [&format!("hip_{side}"), &format!("knee_{side}"), &format!("ankle_{side}"), &format!("foot_{side}")],
            )
            .unwrap()
            .with_step(0.15, 0.3);
            driver.add_foot(foot);
        }
        let mut ik = IkSystem::default();
        driver.register_leg_chains(&s, &mut ik).unwrap();
        (s, driver, ik)
    }

    #[test]
    fn test_standing_still_keeps_phase_and_no_bob() {
        let (s, mut driver, _) = biped_driver();
        let mut pose = SkeletonPose::from_skeleton(&s);
        driver.set_body_state(Vec3::ZERO, Quat::IDENTITY, Vec3::ZERO, Vec3::ZERO);
        for _ in 0..30 {
            driver.update(1.0 / 60.0, &s, &mut pose);
            assert_eq!(driver.phase(), 0.0);
            assert_eq!(driver.body_offset(), Vec3::ZERO);
            assert!(driver.is_still());
        }
    }

    #[test]
    fn test_walking_lifts_feet_alternately() {
        let (s, mut driver, _) = biped_driver();
        let mut pose = SkeletonPose::from_skeleton(&s);
        let dt = 1.0 / 60.0;
        let mut both_airborne = false;
        let mut max_lift = 0.0f32;
        let mut pos = Vec3::ZERO;
        for _ in 0..120 {
            let v = Vec3::new(0.0, 0.0, 1.0);
            pos += v * dt;
            driver.set_body_state(pos, Quat::IDENTITY, v, Vec3::ZERO);
            driver.update(dt, &s, &mut pose);
            let grounded: Vec<bool> = driver.foot_placements().map(|p| p.grounded).collect();
            both_airborne |= !grounded[0] && !grounded[1];
            for p in driver.foot_placements() {
                max_lift = max_lift.max(p.target.y);
            }
        }
        // 占比 0.6：任一时刻至少一只脚着地
        assert!(!both_airborne);
        assert!((max_lift - 0.15).abs() < 0.01);
        assert!(driver.body_offset().y.abs() <= 0.02 * 0.2 + 1e-6);
    }

    #[test]
    fn test_gait_presets_follow_foot_count() {
        let (_, mut driver, _) = biped_driver();
        assert_eq!(driver.timing().phase_offsets, vec![0.0, 0.5]);
        driver.set_gait(GaitType::Fly);
        assert_eq!(driver.timing().duty_factor, 1.0);
        driver.set_timing(GaitTiming::new(0.5, 0.5, vec![0.0, 0.25]));
        assert_eq!(driver.gait(), GaitType::Custom);
        let extra = driver.feet()[0].clone();
        driver.add_foot(extra);
        // 自定义时序不被预设覆盖
        assert_eq!(driver.timing().phase_offsets, vec![0.0, 0.25]);
    }

    #[test]
    fn test_non_walking_gait_zeroes_leg_weight() {
        let (s, mut driver, mut ik) = biped_driver();
        driver.set_gait(GaitType::Swim);
        let mut pose = SkeletonPose::from_skeleton(&s);
        driver.set_body_state(Vec3::ZERO, Quat::IDENTITY, Vec3::new(0.0, 0.0, 1.0), Vec3::ZERO);
        driver.update(1.0 / 60.0, &s, &mut pose);
        assert!(driver.foot_placements().all(|p| p.weight == 0.0));
        driver.apply_to_pose(&s, &mut pose, &mut ik);
        let ankle = s.find_bone("ankle_l").unwrap();
        assert_eq!(pose.local(ankle), SkeletonPose::from_skeleton(&s).local(ankle));
    }

    #[test]
    fn test_blended_legs_follow_leg_weight_while_swimming() {
        let (s, mut driver, _ik) = biped_driver();
        driver.set_blended_legs(true);
        driver.set_gait(GaitType::Swim);
        // 脚仍按行走节奏交替
        assert_eq!(driver.timing(), &GaitTiming::preset(GaitType::Walk, 2));
        let mut pose = SkeletonPose::from_skeleton(&s);
        driver.set_body_state(Vec3::ZERO, Quat::IDENTITY, Vec3::new(0.0, 0.0, 1.0), Vec3::ZERO);
        for w in [0.0, 0.3, 0.49] {
            driver.set_leg_weight(w);
            driver.update(1.0 / 60.0, &s, &mut pose);
            assert!(driver.foot_placements().all(|p| (p.weight - w).abs() < 1e-6));
        }

        driver.set_blended_legs(false);
        assert_eq!(driver.timing().duty_factor, 1.0);
        driver.update(1.0 / 60.0, &s, &mut pose);
        assert!(driver.foot_placements().all(|p| p.weight == 0.0));
    }

    #[test]
    fn test_foot_aligns_to_slope() {
        let (s, mut driver, mut ik) = biped_driver();
        let normal = Vec3::new(0.0, 1.0, -0.3).normalize();
        driver.set_ground_probe(move |origin: Vec3, _: Vec3, _: f32| {
            Some(GroundHit::new(Vec3::new(origin.x, 0.0, origin.z), normal))
        });
        let mut pose = SkeletonPose::from_skeleton(&s);
        driver.update(1.0 / 60.0, &s, &mut pose);
        driver.apply_to_pose(&s, &mut pose, &mut ik);
        pose.calculate_global_transforms(&s);
        let ankle = s.find_bone("ankle_l").unwrap();
        let up = pose.global_rotation(ankle) * Vec3::Y;
        assert!(up.abs_diff_eq(normal, 1e-3), "ankle up {up}");
    }

    #[test]
    fn test_acceleration_pitches_body() {
        let (s, mut driver, _) = biped_driver();
        let mut pose = SkeletonPose::from_skeleton(&s);
        let dt = 0.1;
        driver.set_body_state(Vec3::ZERO, Quat::IDENTITY, Vec3::new(0.0, 0.0, 1.0), Vec3::ZERO);
        driver.update(dt, &s, &mut pose);
        driver.set_body_state(Vec3::ZERO, Quat::IDENTITY, Vec3::new(0.0, 0.0, 2.0), Vec3::ZERO);
        driver.update(dt, &s, &mut pose);
        // 10 m/s² × 0.02 超过上限
        assert!((driver.body_pitch() - 0.1).abs() < 1e-6);
    }
}
