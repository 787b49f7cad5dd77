//! 生物动画器
//!
//! 独占一套骨架、姿势、运动驱动、IK 系统、活动驱动和蒙皮调色板，
//! 每帧按固定顺序合成：
//!
//! 1. 姿势复位到绑定姿势
//! 2. 运动驱动推进相位、计算落脚点、叠加翅膀/脊柱/游泳振荡
//! 3. 活动驱动推进淡入淡出
//! 4. 运动驱动求解腿部 IK（基础层）
//! 5. 活动叠加层按遮罩和权重混合
//! 6. 重算全局矩阵与蒙皮矩阵，写入调色板

mod config;
mod pool;
mod rig;

pub use config::AnimatorConfig;
pub use pool::update_animators;
pub use rig::CreatureRig;

use glam::{Mat4, Quat, Vec3};

use crate::activity::{ActivityDriver, ActivityId, ActivityOverlay, OverlayDelta};
use crate::ik::IkSystem;
use crate::locomotion::{GaitType, GroundProbe, LocomotionDriver};
use crate::pose::{SkeletonPose, SkinningPalette};
use crate::skeleton::{Morphology, Skeleton};
use crate::Result;

/// 内置注视叠加层的标识
pub const GAZE_ACTIVITY: ActivityId = u32::MAX;
/// 内置呼吸叠加层的标识
pub const BREATHE_ACTIVITY: ActivityId = u32::MAX - 1;

/// 内置叠加层的优先级，高于一般活动
const BUILTIN_PRIORITY: i32 = 1000;

/// 生物动画器
#[derive(Debug)]
pub struct CreatureAnimator {
    skeleton: Skeleton,
    pose: SkeletonPose,
    locomotion: LocomotionDriver,
    ik: IkSystem,
    activity: ActivityDriver,
    palette: SkinningPalette,
    config: AnimatorConfig,

    morphology: Option<Morphology>,
    gaze_bones: Vec<usize>,
    chest: Option<usize>,
    /// 两栖混合：0 = 游泳，1 = 行走；非两栖时为 None
    amphibious_blend: Option<f32>,
    /// 世界空间注视点与权重，每帧按当前身体变换转换到模型空间
    look_target: Option<(Vec3, f32)>,
    frame: u64,
}

impl CreatureAnimator {
    /// 使用已有骨架创建，脚、翅膀等由调用者通过 [`locomotion_mut`](Self::locomotion_mut) 配置
    pub fn new(skeleton: Skeleton, mut config: AnimatorConfig) -> Self {
        config.sanitize();
        let pose = SkeletonPose::from_skeleton(&skeleton);
        let mut palette = SkinningPalette::new();
        palette.update_from_pose(&pose);
        log::debug!("[Animator] 创建动画器: {} 个骨骼", skeleton.len());
        Self {
            locomotion: LocomotionDriver::new(config.clone()),
            ik: IkSystem::new(config.ik),
            activity: ActivityDriver::new(),
            skeleton,
            pose,
            palette,
            config,
            morphology: None,
            gaze_bones: Vec::new(),
            chest: None,
            amphibious_blend: None,
            look_target: None,
            frame: 0,
        }
    }

    /// 从装配创建：注册脚、翅膀、脊柱、游泳配置与腿部 IK 链
    pub fn from_rig(rig: CreatureRig, config: AnimatorConfig) -> Result<Self> {
        let CreatureRig {
            morphology,
            skeleton,
            feet,
            wings,
            spine,
            swim,
            gait,
            gaze_bones,
            chest,
            amphibious,
        } = rig;

        let mut animator = Self::new(skeleton, config);
        let loco = &mut animator.locomotion;
        for foot in feet {
            loco.add_foot(foot);
        }
        for wing in wings {
            loco.add_wing(wing);
        }
        loco.set_spine(spine);
        loco.set_swim(swim);
        loco.set_gait(gait);
        loco.register_leg_chains(&animator.skeleton, &mut animator.ik)?;

        animator.morphology = Some(morphology);
        animator.gaze_bones = gaze_bones;
        animator.chest = chest;
        if amphibious {
            animator.set_amphibious_blend(1.0);
        }
        log::debug!(
            "[Animator] 装配 {:?}: {} 条腿, {} 只翅膀, 步态 {:?}",
            morphology,
            animator.locomotion.feet().len(),
            animator.locomotion.wings().len(),
            animator.locomotion.gait()
        );
        Ok(animator)
    }

    // ========================================
    // 输入
    // ========================================

    /// 设置本帧的身体位置、朝向、线速度、角速度（世界空间）
    pub fn set_body_state(&mut self, position: Vec3, rotation: Quat, velocity: Vec3, angular_velocity: Vec3) {
        self.locomotion.set_body_state(position, rotation, velocity, angular_velocity);
    }

    pub fn set_gait(&mut self, gait: GaitType) {
        self.locomotion.set_gait(gait);
    }

    pub fn set_ground_probe(&mut self, probe: impl GroundProbe + Send + 'static) {
        self.locomotion.set_ground_probe(probe);
    }

    /// 两栖混合：小于 0.5 时游泳，否则行走；腿部 IK 权重 = blend，游泳波幅 = 1 − blend
    pub fn set_amphibious_blend(&mut self, blend: f32) {
        let blend = if blend.is_finite() { blend.clamp(0.0, 1.0) } else { 1.0 };
        let gait = if blend < 0.5 { GaitType::Swim } else { GaitType::Walk };
        self.locomotion.set_blended_legs(true);
        self.locomotion.set_gait(gait);
        self.locomotion.set_leg_weight(blend);
        self.locomotion.set_swim_weight(1.0 - blend);
        self.amphibious_blend = Some(blend);
    }

    #[inline]
    pub fn amphibious_blend(&self) -> Option<f32> {
        self.amphibious_blend
    }

    /// 注视世界空间中的点，头颈骨骼由内置注视叠加层转动；身体移动或转向后仍看向同一点
    pub fn look_at(&mut self, world_target: Vec3, weight: f32) {
        self.look_target = Some((world_target, weight));
        self.ik.set_look_at(self.locomotion.world_to_model(world_target), weight);
        if !self.gaze_bones.is_empty() && self.activity.overlay(GAZE_ACTIVITY).is_none() {
            let gaze = OverlayDelta::Gaze {
                bones: self.gaze_bones.clone(),
                max_angle: std::f32::consts::FRAC_PI_2,
            };
            self.activity
                .push(ActivityOverlay::new(GAZE_ACTIVITY, gaze).with_priority(BUILTIN_PRIORITY), 0.3);
        }
    }

    #[inline]
    pub fn look_target(&self) -> Option<(Vec3, f32)> {
        self.look_target
    }

    pub fn clear_look_at(&mut self) {
        self.look_target = None;
        self.ik.clear_look_at();
        self.activity.remove(GAZE_ACTIVITY, 0.0);
    }

    /// 开启胸部呼吸缩放，返回是否有胸部骨骼
    pub fn enable_breathing(&mut self, rate: f32, amount: f32) -> bool {
        let Some(bone) = self.chest else {
            return false;
        };
        let breathe = OverlayDelta::Breathe { bone, rate, amount };
        self.activity
            .push(ActivityOverlay::new(BREATHE_ACTIVITY, breathe).with_priority(BUILTIN_PRIORITY), 0.5);
        true
    }

    pub fn disable_breathing(&mut self) {
        self.activity.remove(BREATHE_ACTIVITY, 0.5);
    }

    pub fn set_config(&mut self, mut config: AnimatorConfig) {
        config.sanitize();
        self.ik.set_config(config.ik);
        self.locomotion.set_config(config.clone());
        self.config = config;
    }

    // ========================================
    // 每帧
    // ========================================

    /// 推进一帧并生成蒙皮调色板
    pub fn update(&mut self, dt: f32) {
        if !dt.is_finite() || dt < 0.0 {
            log::warn!("[Animator] 忽略无效的时间步长 {dt}");
            return;
        }

        self.pose.set_to_bind_pose(&self.skeleton);
        self.locomotion.update(dt, &self.skeleton, &mut self.pose);
        self.activity.update(dt);
        self.locomotion.apply_to_pose(&self.skeleton, &mut self.pose, &mut self.ik);
        if let Some((target, weight)) = self.look_target {
            self.ik.set_look_at(self.locomotion.world_to_model(target), weight);
        }
        self.activity
            .apply_to_pose(&self.skeleton, &mut self.pose, &self.locomotion, &self.ik);
        self.pose.update_matrices(&self.skeleton);
        self.palette.update_from_pose(&self.pose);

        self.frame += 1;
        if self.config.debug_log {
            log::debug!(
                "[Animator] 帧 {} dt={dt:.4} 步态 {:?} 相位 {:.3}",
                self.frame,
                self.locomotion.gait(),
                self.locomotion.phase()
            );
        }
    }

    /// 姿势复位到绑定姿势并重算矩阵
    pub fn reset_to_bind_pose(&mut self) {
        self.pose.set_to_bind_pose(&self.skeleton);
        self.pose.update_matrices(&self.skeleton);
        self.palette.update_from_pose(&self.pose);
    }

    // ========================================
    // 访问器
    // ========================================

    #[inline]
    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    #[inline]
    pub fn pose(&self) -> &SkeletonPose {
        &self.pose
    }

    #[inline]
    pub fn locomotion(&self) -> &LocomotionDriver {
        &self.locomotion
    }

    #[inline]
    pub fn locomotion_mut(&mut self) -> &mut LocomotionDriver {
        &mut self.locomotion
    }

    #[inline]
    pub fn ik(&self) -> &IkSystem {
        &self.ik
    }

    #[inline]
    pub fn ik_mut(&mut self) -> &mut IkSystem {
        &mut self.ik
    }

    #[inline]
    pub fn activity(&self) -> &ActivityDriver {
        &self.activity
    }

    #[inline]
    pub fn activity_mut(&mut self) -> &mut ActivityDriver {
        &mut self.activity
    }

    #[inline]
    pub fn palette(&self) -> &SkinningPalette {
        &self.palette
    }

    /// 上一次 [`update`](Self::update) 结束时的蒙皮矩阵
    #[inline]
    pub fn skinning_matrices(&self) -> &[Mat4] {
        self.palette.active()
    }

    #[inline]
    pub fn config(&self) -> &AnimatorConfig {
        &self.config
    }

    #[inline]
    pub fn morphology(&self) -> Option<Morphology> {
        self.morphology
    }

    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// 同时借出骨架与 IK 系统，便于添加额外的 IK 链
    pub fn skeleton_and_ik_mut(&mut self) -> (&Skeleton, &mut IkSystem) {
        (&self.skeleton, &mut self.ik)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::ik::{solve_fabrik, solve_two_bone, ChainSolver, IkConfig, IkScratch, IkTarget};
    use crate::locomotion::GroundHit;
    use crate::skeleton::BoneTransform;

    const DT: f32 = 1.0 / 60.0;

    fn init_log() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn biped() -> CreatureAnimator {
        CreatureAnimator::from_rig(CreatureRig::biped(1.0).unwrap(), AnimatorConfig::default()).unwrap()
    }

    fn leg_bones(a: &CreatureAnimator) -> Vec<usize> {
        a.locomotion()
            .feet()
            .iter()
            .flat_map(|f| [f.hip, f.knee, f.ankle, f.foot_end])
            .collect()
    }

    #[test]
    fn test_biped_idle_stays_at_bind() {
        init_log();
        let mut a = biped();
        let bind = SkeletonPose::from_skeleton(a.skeleton());
        a.set_body_state(Vec3::ZERO, Quat::IDENTITY, Vec3::ZERO, Vec3::ZERO);
        for _ in 0..60 {
            a.update(DT);
            assert!(a.locomotion().body_offset().y.abs() < 1e-3);
            for bone in leg_bones(&a) {
                let p = a.pose().global_position(bone);
                let q = bind.global_position(bone);
                assert!(p.distance(q) < 1e-2, "bone {bone} drifted to {p}");
            }
        }
        assert_eq!(a.locomotion().phase(), 0.0);
        // 静止时蒙皮矩阵接近单位矩阵
        for m in a.skinning_matrices() {
            assert!(m.abs_diff_eq(Mat4::IDENTITY, 1e-2));
        }
    }

    #[test]
    fn test_biped_walk_alternates_and_arcs() {
        init_log();
        let mut a = biped();
        let v = Vec3::new(0.0, 0.0, 1.0);
        let mut pos = Vec3::ZERO;
        let mut peak = [0.0f32; 2];
        let mut grounded_history = Vec::new();
        let mut landings = [Vec::new(), Vec::new()];
        let mut was_grounded = [true; 2];
        let mut lift_offs = [Vec::new(), Vec::new()];
        let mut phase = a.locomotion().phase();
        let mut max_step = 0.0f32;

        for _ in 0..120 {
            pos += v * DT;
            a.set_body_state(pos, Quat::IDENTITY, v, Vec3::ZERO);
            a.update(DT);
            let next = a.locomotion().phase();
            max_step = max_step.max((next - phase).rem_euclid(1.0));
            phase = next;
            let placements: Vec<_> = a.locomotion().foot_placements().copied().collect();
            for (i, p) in placements.iter().enumerate() {
                peak[i] = peak[i].max(p.target.y);
                if p.grounded && !was_grounded[i] {
                    // 落点相对身体的前向距离
                    landings[i].push(p.target.z - pos.z);
                }
                if !p.grounded && was_grounded[i] {
                    lift_offs[i].push(phase);
                }
                was_grounded[i] = p.grounded;
            }
            grounded_history.push([placements[0].grounded, placements[1].grounded]);
        }

        for i in 0..2 {
            assert!((peak[i] - 0.15).abs() < 0.01, "foot {i} peak {}", peak[i]);
            assert!(!landings[i].is_empty());
            for d in &landings[i] {
                // 落在静止点前方半个步幅（0.3 / 2）
                assert!((d - 0.15).abs() < 0.02, "foot {i} landed {d} ahead");
            }
        }
        // 两只脚的抬脚相位相差半个周期，误差不超过一帧的相位步长
        assert!(!lift_offs[0].is_empty() && !lift_offs[1].is_empty());
        for &l in &lift_offs[1] {
            for &r in &lift_offs[0] {
                let d = (l - r).rem_euclid(1.0);
                assert!((d - 0.5).abs() <= max_step + 1e-4, "lift-off phases {r} and {l} differ by {d}");
            }
        }
        // 两只脚不会同时腾空，且各自都有腾空的时刻
        assert!(grounded_history.iter().all(|g| g[0] || g[1]));
        assert!(grounded_history.iter().any(|g| !g[0]));
        assert!(grounded_history.iter().any(|g| !g[1]));
    }

    #[test]
    fn test_quadruped_trot_diagonals() {
        init_log();
        let rig = CreatureRig::quadruped(1.0).unwrap();
        let mut a = CreatureAnimator::from_rig(rig, AnimatorConfig::default()).unwrap();
        a.set_gait(GaitType::Trot);
        let timing = a.locomotion().timing().clone();
        assert_eq!(timing.offset(0), timing.offset(3));
        assert_eq!(timing.offset(1), timing.offset(2));

        let v = Vec3::new(3.0, 0.0, 0.0);
        let mut pos = Vec3::ZERO;
        for _ in 0..180 {
            pos += v * DT;
            a.set_body_state(pos, Quat::IDENTITY, v, Vec3::ZERO);
            a.update(DT);
            let g: Vec<bool> = a.locomotion().foot_placements().map(|p| p.grounded).collect();
            assert_eq!(g[0], g[3]);
            assert_eq!(g[1], g[2]);
            assert_eq!(g.iter().filter(|&&x| x).count(), 2);
        }
    }

    #[test]
    fn test_two_bone_arm_reach() {
        let mut s = Skeleton::new();
        s.add_bone("shoulder", -1, BoneTransform::IDENTITY).unwrap();
        s.add_bone("elbow", 0, BoneTransform::from_translation(Vec3::new(0.0, -1.0, 0.01))).unwrap();
        s.add_bone("wrist", 1, BoneTransform::from_translation(Vec3::new(0.0, -1.0, -0.01))).unwrap();
        let mut pose = SkeletonPose::from_skeleton(&s);
        let target = Vec3::new(0.0, -1.5, 0.0);

        let solution = solve_two_bone(&s, &mut pose, 0, 1, 2, &IkTarget::at(target), None, &IkConfig::default());
        assert!(solution.is_ok());
        pose.calculate_global_transforms(&s);
        assert!(pose.global_position(2).distance(target) < 1e-3);
        let elbow = pose.global_position(1);
        assert!(elbow.y < 0.0 && elbow.y > -1.5);
    }

    #[test]
    fn test_fabrik_spine_reach() {
        let mut s = Skeleton::new();
        s.add_bone("s0", -1, BoneTransform::IDENTITY).unwrap();
        for k in 1..=5 {
            s.add_bone(format!("s{k}"), k - 1, BoneTransform::from_translation(Vec3::Y)).unwrap();
        }
        let mut pose = SkeletonPose::from_skeleton(&s);
        let chain: Vec<usize> = (0..=5).collect();
        let mut scratch = IkScratch::default();
        let target = Vec3::new(1.0, 1.5, 0.0);
        let config = IkConfig::default();

        let solution = solve_fabrik(&s, &mut pose, &chain, &IkTarget::at(target), &config, &mut scratch).unwrap();
        assert!(solution.iterations <= 20);
        pose.calculate_global_transforms(&s);
        assert!(pose.global_position(0).length() < 1e-3);
        assert!(pose.global_position(5).distance(target) < 0.1);
    }

    #[test]
    fn test_ground_probe_height() {
        init_log();
        let rig = CreatureRig::quadruped(1.0).unwrap();
        let mut a = CreatureAnimator::from_rig(rig, AnimatorConfig::default()).unwrap();
        a.set_ground_probe(|origin: Vec3, _dir: Vec3, _max: f32| {
            Some(GroundHit::new(Vec3::new(origin.x, 0.2, origin.z), Vec3::Y))
        });

        let v = Vec3::new(0.0, 0.0, 1.5);
        let mut pos = Vec3::new(0.0, 1.0, 0.0);
        let mut peak = 0.0f32;
        for _ in 0..180 {
            pos += v * DT;
            a.set_body_state(pos, Quat::IDENTITY, v, Vec3::ZERO);
            a.update(DT);
            for p in a.locomotion().foot_placements() {
                if p.grounded {
                    assert!((p.target.y - 0.2).abs() < 1e-4, "stance at {}", p.target.y);
                } else {
                    assert!(p.target.y >= 0.2 - 1e-4);
                }
                peak = peak.max(p.target.y);
            }
        }
        assert!((peak - 0.35).abs() < 0.01, "peak {peak}");
    }

    #[test]
    fn test_flier_wings_fold_when_walking() {
        let mut a = CreatureAnimator::from_rig(CreatureRig::flier(2.0).unwrap(), AnimatorConfig::default()).unwrap();
        for _ in 0..30 {
            a.update(DT);
        }
        assert!(a.locomotion().wing_weight() > 0.8);
        let shoulder = a.locomotion().wings()[0].shoulder;

        a.set_gait(GaitType::Walk);
        for _ in 0..240 {
            a.update(DT);
        }
        assert!(a.locomotion().wing_weight() < 0.01);
        let folded = a.pose().local(shoulder).unwrap().rotation;
        assert!(folded.angle_between(Quat::IDENTITY) < 0.02);
    }

    #[test]
    fn test_amphibious_blend_switches_gait() {
        let mut rng = StdRng::seed_from_u64(5);
        let rig = CreatureRig::amphibian(1.0, &mut rng).unwrap();
        let mut a = CreatureAnimator::from_rig(rig, AnimatorConfig::default()).unwrap();
        assert_eq!(a.amphibious_blend(), Some(1.0));
        assert_eq!(a.locomotion().gait(), GaitType::Walk);

        a.set_amphibious_blend(0.2);
        assert_eq!(a.locomotion().gait(), GaitType::Swim);
        assert!((a.locomotion().leg_weight() - 0.2).abs() < 1e-6);
        assert!((a.locomotion().swim_weight() - 0.8).abs() < 1e-6);

        let v = Vec3::new(0.0, 0.0, 1.0);
        a.set_body_state(Vec3::ZERO, Quat::IDENTITY, v, Vec3::ZERO);
        // 腿部 IK 权重随混合连续变化，中点两侧没有跳变
        for blend in [0.0, 0.3, 0.49, 0.5, 0.7, 1.0] {
            a.set_amphibious_blend(blend);
            a.update(DT);
            assert!(
                a.locomotion().foot_placements().all(|p| (p.weight - blend).abs() < 1e-6),
                "leg weight at blend {blend}"
            );
        }
        a.set_amphibious_blend(0.2);
        let tail = a.skeleton().find_bone("tail_03").unwrap();
        for _ in 0..30 {
            a.update(DT);
        }
        assert!(a.pose().local(tail).unwrap().rotation.angle_between(Quat::IDENTITY) > 1e-4);
    }

    #[test]
    fn test_look_at_and_breathing_overlays() {
        let mut a = biped();
        assert!(a.enable_breathing(0.3, 0.03));
        let head = a.skeleton().find_bone("head").unwrap();
        a.look_at(Vec3::new(2.0, 0.95, 0.0), 1.0);
        for _ in 0..60 {
            a.update(DT);
        }
        let forward = a.pose().global_rotation(head) * Vec3::Z;
        assert!(forward.x > 0.3, "head forward {forward}");

        a.clear_look_at();
        a.update(DT);
        let forward = a.pose().global_rotation(head) * Vec3::Z;
        assert!(forward.x.abs() < 1e-3);
        assert!(a.activity().overlay(BREATHE_ACTIVITY).is_some());
    }

    #[test]
    fn test_look_at_tracks_world_point_after_turning() {
        let mut a = biped();
        let head = a.skeleton().find_bone("head").unwrap();
        a.look_at(Vec3::new(2.0, 0.95, 0.0), 1.0);
        for _ in 0..60 {
            a.update(DT);
        }
        let forward = a.pose().global_rotation(head) * Vec3::Z;
        assert!(forward.x > 0.3, "head forward {forward}");

        // 转身 180°：世界 +X 在模型空间变为 -X
        a.set_body_state(Vec3::ZERO, Quat::from_rotation_y(std::f32::consts::PI), Vec3::ZERO, Vec3::ZERO);
        for _ in 0..60 {
            a.update(DT);
        }
        let forward = a.pose().global_rotation(head) * Vec3::Z;
        assert!(forward.x < -0.3, "head forward after turning {forward}");
        let world = Quat::from_rotation_y(std::f32::consts::PI) * forward;
        assert!(world.x > 0.3);
    }

    #[test]
    fn test_reset_to_bind_pose() {
        let mut a = biped();
        let v = Vec3::new(0.0, 0.0, 2.0);
        a.set_body_state(Vec3::ZERO, Quat::IDENTITY, v, Vec3::ZERO);
        for _ in 0..20 {
            a.update(DT);
        }
        a.reset_to_bind_pose();
        for m in a.skinning_matrices() {
            assert!(m.abs_diff_eq(Mat4::IDENTITY, 1e-3));
        }
        assert_eq!(a.palette().active_bone_count(), a.skeleton().len());
    }

    #[test]
    fn test_extra_chain_on_animator() {
        let mut a = biped();
        let (skeleton, ik) = a.skeleton_and_ik_mut();
        let shoulder = skeleton.find_bone("shoulder_l").unwrap();
        let wrist = skeleton.find_bone("wrist_l").unwrap();
        let handle = ik.add_chain(skeleton, shoulder, wrist, ChainSolver::TwoBone, 0).unwrap();
        // 手臂全长 0.29，目标在范围内
        let reach = a.pose().global_position(shoulder) + Vec3::new(0.15, -0.15, 0.05);
        a.ik_mut().set_target(handle, IkTarget::at(reach)).unwrap();
        a.update(DT);
        assert!(a.pose().global_position(wrist).distance(reach) < 1e-2);
    }
}
