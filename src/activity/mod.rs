//! 活动驱动器
//!
//! 在运动基础层之上按遮罩和权重叠加活动姿势（进食、注视、呼吸……）。
//! 内部叠加层支持贝塞尔缓动的淡入淡出；外部状态机通过 [`ActivitySource`]
//! 每帧提供自己的叠加层，与内部叠加层一起按优先级升序施加。

mod easing;
mod overlay;

pub use easing::{BezierCurve, Curve};
pub use overlay::{ActivityId, ActivityOverlay, ActivitySource, OverlayDelta};

use self::overlay::OverlayContext;
use crate::ik::IkSystem;
use crate::locomotion::LocomotionDriver;
use crate::pose::SkeletonPose;
use crate::skeleton::Skeleton;

/// 淡入淡出包络
#[derive(Clone, Copy, Debug, PartialEq)]
struct Envelope {
    from: f32,
    to: f32,
    elapsed: f32,
    duration: f32,
}

impl Envelope {
    fn settled(value: f32) -> Self {
        Self { from: value, to: value, elapsed: 0.0, duration: 0.0 }
    }

    fn fade(from: f32, to: f32, duration: f32) -> Self {
        Self { from, to, elapsed: 0.0, duration: duration.max(0.0) }
    }

    #[inline]
    fn finished(&self) -> bool {
        self.elapsed >= self.duration
    }

    fn value(&self, curve: &BezierCurve) -> f32 {
        if self.finished() {
            return self.to;
        }
        let t = self.elapsed / self.duration;
        self.from + (self.to - self.from) * curve.value(t)
    }
}

#[derive(Clone, Debug)]
struct Entry {
    overlay: ActivityOverlay,
    envelope: Envelope,
    /// 淡出结束后移除
    removing: bool,
    serial: u64,
}

/// 排序键来源
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Origin {
    Internal,
    External,
}

/// 活动驱动器
pub struct ActivityDriver {
    entries: Vec<Entry>,
    source: Option<Box<dyn ActivitySource>>,
    curve: BezierCurve,
    /// 排序缓冲：(优先级, 来源, 序号, 索引)
    order: Vec<(i32, Origin, u64, usize)>,
    time: f32,
    next_serial: u64,
}

impl std::fmt::Debug for ActivityDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityDriver")
            .field("entries", &self.entries)
            .field("has_source", &self.source.is_some())
            .field("time", &self.time)
            .finish_non_exhaustive()
    }
}

impl Default for ActivityDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityDriver {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            source: None,
            curve: BezierCurve::default(),
            order: Vec::new(),
            time: 0.0,
            next_serial: 0,
        }
    }

    // ========================================
    // 内部叠加层
    // ========================================

    /// 添加叠加层，在 `fade_in` 秒内淡入；同 id 的叠加层被替换并从当前权重继续淡入
    pub fn push(&mut self, overlay: ActivityOverlay, fade_in: f32) {
        let id = overlay.id;
        if let Some(entry) = self.entries.iter_mut().find(|e| e.overlay.id == id) {
            let current = entry.envelope.value(&self.curve);
            entry.overlay = overlay;
            entry.envelope = Envelope::fade(current, 1.0, fade_in);
            entry.removing = false;
            log::debug!("[Activity] 替换叠加层 {id}");
            return;
        }

        let envelope = if fade_in > 0.0 { Envelope::fade(0.0, 1.0, fade_in) } else { Envelope::settled(1.0) };
        self.entries.push(Entry { overlay, envelope, removing: false, serial: self.next_serial });
        self.next_serial += 1;
        self.order.reserve(1);
        log::debug!("[Activity] 添加叠加层 {id}，淡入 {fade_in:.2}s");
    }

    /// 在 `fade_out` 秒内淡出后移除，返回是否找到
    pub fn remove(&mut self, id: ActivityId, fade_out: f32) -> bool {
        let Some(pos) = self.entries.iter().position(|e| e.overlay.id == id) else {
            return false;
        };
        if fade_out <= 0.0 {
            self.entries.remove(pos);
            log::debug!("[Activity] 移除叠加层 {id}");
        } else {
            let entry = &mut self.entries[pos];
            let current = entry.envelope.value(&self.curve);
            entry.envelope = Envelope::fade(current, 0.0, fade_out);
            entry.removing = true;
        }
        true
    }

    /// 设置叠加层自身的混合权重，返回是否找到
    pub fn set_weight(&mut self, id: ActivityId, weight: f32) -> bool {
        match self.entries.iter_mut().find(|e| e.overlay.id == id) {
            Some(entry) => {
                entry.overlay.weight = weight.clamp(0.0, 1.0);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn overlay(&self, id: ActivityId) -> Option<&ActivityOverlay> {
        self.entries.iter().find(|e| e.overlay.id == id).map(|e| &e.overlay)
    }

    /// 叠加层当前的有效权重（自身权重 × 淡入淡出包络）
    pub fn effective_weight(&self, id: ActivityId) -> Option<f32> {
        self.entries
            .iter()
            .find(|e| e.overlay.id == id)
            .map(|e| e.overlay.weight * e.envelope.value(&self.curve))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 淡入淡出曲线，默认 ease-in-out
    pub fn set_curve(&mut self, curve: BezierCurve) {
        self.curve = curve;
    }

    #[inline]
    pub fn time(&self) -> f32 {
        self.time
    }

    // ========================================
    // 外部状态机
    // ========================================

    pub fn set_source(&mut self, source: impl ActivitySource + 'static) {
        self.source = Some(Box::new(source));
    }

    pub fn clear_source(&mut self) -> Option<Box<dyn ActivitySource>> {
        self.source.take()
    }

    #[inline]
    pub fn source(&self) -> Option<&dyn ActivitySource> {
        self.source.as_deref()
    }

    // ========================================
    // 每帧更新
    // ========================================

    /// 推进淡入淡出，移除淡出完成的叠加层，并让外部状态机更新
    pub fn update(&mut self, dt: f32) {
        if !dt.is_finite() || dt < 0.0 {
            log::warn!("[Activity] 忽略无效的时间步长 {dt}");
            return;
        }
        self.time += dt;
        for entry in &mut self.entries {
            entry.envelope.elapsed += dt;
        }
        self.entries.retain(|e| {
            let done = e.removing && e.envelope.finished();
            if done {
                log::debug!("[Activity] 叠加层 {} 淡出完成", e.overlay.id);
            }
            !done
        });
        if let Some(source) = &mut self.source {
            source.update(dt);
        }
    }

    /// 按优先级升序施加所有叠加层，返回实际施加的数量
    pub fn apply_to_pose(
        &mut self,
        skeleton: &Skeleton,
        pose: &mut SkeletonPose,
        locomotion: &LocomotionDriver,
        ik: &IkSystem,
    ) -> usize {
        if pose.len() != skeleton.len() {
            log::warn!("[Activity] 姿势与骨架不匹配，跳过叠加");
            return 0;
        }

        self.order.clear();
        for (i, entry) in self.entries.iter().enumerate() {
            self.order.push((entry.overlay.priority, Origin::Internal, entry.serial, i));
        }
        if let Some(source) = &self.source {
            for (i, overlay) in source.overlays().iter().enumerate() {
                self.order.push((overlay.priority, Origin::External, i as u64, i));
            }
        }
        self.order.sort_unstable();

        let ctx = OverlayContext { skeleton, locomotion, ik, time: self.time };
        let mut applied = 0;
        for &(_, origin, _, i) in &self.order {
            let (overlay, envelope) = match origin {
                Origin::Internal => {
                    let entry = &self.entries[i];
                    (&entry.overlay, entry.envelope.value(&self.curve))
                }
                Origin::External => match self.source.as_deref().and_then(|s| s.overlays().get(i)) {
                    Some(overlay) => (overlay, 1.0),
                    None => continue,
                },
            };
            let weight = (overlay.weight * envelope).clamp(0.0, 1.0);
            if weight <= 0.0 {
                continue;
            }
            match overlay.delta.apply(&overlay.mask, weight, &ctx, pose) {
                Ok(()) => applied += 1,
                Err(e) => log::trace!("[Activity] 跳过叠加层 {}: {e}", overlay.id),
            }
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec3};

    use super::*;
    use crate::animator::AnimatorConfig;
    use crate::pose::BoneMask;
    use crate::skeleton::SkeletonFactory;

    struct Fixture {
        skeleton: Skeleton,
        pose: SkeletonPose,
        locomotion: LocomotionDriver,
        ik: IkSystem,
    }

    impl Fixture {
        fn new() -> Self {
            let skeleton = SkeletonFactory::biped(1.0).unwrap();
            let pose = SkeletonPose::from_skeleton(&skeleton);
            Self {
                skeleton,
                pose,
                locomotion: LocomotionDriver::new(AnimatorConfig::default()),
                ik: IkSystem::default(),
            }
        }

        fn apply(&mut self, driver: &mut ActivityDriver) -> usize {
            self.pose.set_to_bind_pose(&self.skeleton);
            let n = driver.apply_to_pose(&self.skeleton, &mut self.pose, &self.locomotion, &self.ik);
            self.pose.update_matrices(&self.skeleton);
            n
        }

        fn bone(&self, name: &str) -> usize {
            self.skeleton.find_bone(name).unwrap()
        }
    }

    fn raised_arm(f: &Fixture, angle: f32) -> SkeletonPose {
        let mut pose = SkeletonPose::from_skeleton(&f.skeleton);
        let shoulder = f.bone("shoulder_l");
        pose.local_mut(shoulder).unwrap().rotation = Quat::from_rotation_z(angle);
        pose
    }

    #[test]
    fn test_pose_overlay_respects_mask() {
        let mut f = Fixture::new();
        let shoulder = f.bone("shoulder_l");
        let mut target = raised_arm(&f, 1.0);
        // 遮罩外的骨骼即使有差异也不受影响
        let head = f.bone("head");
        target.local_mut(head).unwrap().rotation = Quat::from_rotation_y(1.0);

        let mut driver = ActivityDriver::new();
        let mask = BoneMask::from_subtree(&f.skeleton, shoulder);
        driver.push(ActivityOverlay::new(1, OverlayDelta::Pose(target)).with_mask(mask), 0.0);
        assert_eq!(f.apply(&mut driver), 1);

        let rot = f.pose.local(shoulder).unwrap().rotation;
        assert!(rot.angle_between(Quat::from_rotation_z(1.0)) < 1e-4);
        assert_eq!(f.pose.local(head).unwrap().rotation, Quat::IDENTITY);
    }

    #[test]
    fn test_fade_in_and_out() {
        let mut f = Fixture::new();
        let mut driver = ActivityDriver::new();
        let target = raised_arm(&f, 1.0);
        driver.push(ActivityOverlay::new(7, OverlayDelta::Pose(target)), 0.5);
        assert_eq!(driver.effective_weight(7), Some(0.0));

        driver.update(0.25);
        let mid = driver.effective_weight(7).unwrap();
        assert!((mid - 0.5).abs() < 0.05, "mid weight {mid}");
        driver.update(0.25);
        assert_eq!(driver.effective_weight(7), Some(1.0));
        assert_eq!(f.apply(&mut driver), 1);

        assert!(driver.remove(7, 0.5));
        driver.update(0.3);
        assert_eq!(driver.len(), 1);
        driver.update(0.3);
        assert!(driver.is_empty());
        assert!(!driver.remove(7, 0.0));
    }

    #[test]
    fn test_priority_order_highest_wins() {
        let mut f = Fixture::new();
        let shoulder = f.bone("shoulder_l");
        let mut driver = ActivityDriver::new();
        driver.push(ActivityOverlay::new(1, OverlayDelta::Pose(raised_arm(&f, 1.0))).with_priority(5), 0.0);
        driver.push(ActivityOverlay::new(2, OverlayDelta::Pose(raised_arm(&f, -1.0))).with_priority(1), 0.0);
        assert_eq!(f.apply(&mut driver), 2);
        let rot = f.pose.local(shoulder).unwrap().rotation;
        assert!(rot.angle_between(Quat::from_rotation_z(1.0)) < 1e-4);
    }

    #[test]
    fn test_additive_overlay_with_zero_delta_is_noop() {
        let mut f = Fixture::new();
        let bind = SkeletonPose::from_skeleton(&f.skeleton);
        let mut driver = ActivityDriver::new();
        driver.push(
            ActivityOverlay::new(3, OverlayDelta::Additive { pose: bind.clone(), bind }),
            0.0,
        );
        f.apply(&mut driver);
        let reference = SkeletonPose::from_skeleton(&f.skeleton);
        for (a, b) in f.pose.locals().iter().zip(reference.locals()) {
            assert!(a.abs_diff_eq(b, 1e-5));
        }
    }

    #[test]
    fn test_gaze_turns_head_within_limit() {
        let mut f = Fixture::new();
        let neck = f.bone("neck");
        let head = f.bone("head");
        let head_pos = f.pose.global_position(head);
        // 目标在头部左侧
        f.ik.set_look_at(head_pos + Vec3::new(1.0, 0.0, 0.0), 1.0);

        let mut driver = ActivityDriver::new();
        let gaze = OverlayDelta::Gaze { bones: vec![neck, head], max_angle: 1.0 };
        driver.push(ActivityOverlay::new(4, gaze), 0.0);
        f.apply(&mut driver);

        let forward = f.pose.global_rotation(head) * Vec3::Z;
        let turned = forward.angle_between(Vec3::Z);
        assert!(turned > 0.5, "head barely turned: {turned}");
        assert!(turned <= 1.0 + 1e-3, "limit exceeded: {turned}");
        assert!(forward.x > 0.0);

        // 没有注视目标时不动
        f.ik.clear_look_at();
        f.apply(&mut driver);
        assert!(f.pose.global_rotation(head).angle_between(Quat::IDENTITY) < 1e-5);
    }

    #[test]
    fn test_breathe_scales_chest() {
        let mut f = Fixture::new();
        let chest = f.bone("spine_03");
        let mut driver = ActivityDriver::new();
        driver.push(
            ActivityOverlay::new(5, OverlayDelta::Breathe { bone: chest, rate: 0.25, amount: 0.05 }),
            0.0,
        );
        driver.update(1.0);
        f.apply(&mut driver);
        let scale = f.pose.local(chest).unwrap().scale;
        assert!((scale.x - 1.05).abs() < 1e-4);
        assert_eq!(scale.y, 1.0);
    }

    struct Scripted {
        overlays: Vec<ActivityOverlay>,
        ticks: u32,
    }

    impl ActivitySource for Scripted {
        fn update(&mut self, _dt: f32) {
            self.ticks += 1;
        }

        fn overlays(&self) -> &[ActivityOverlay] {
            &self.overlays
        }
    }

    #[test]
    fn test_external_source_merged_by_priority() {
        let mut f = Fixture::new();
        let shoulder = f.bone("shoulder_l");
        let mut driver = ActivityDriver::new();
        driver.push(ActivityOverlay::new(1, OverlayDelta::Pose(raised_arm(&f, 1.0))).with_priority(0), 0.0);
        driver.set_source(Scripted {
            overlays: vec![ActivityOverlay::new(9, OverlayDelta::Pose(raised_arm(&f, -0.5))).with_priority(10)],
            ticks: 0,
        });
        driver.update(0.1);
        assert_eq!(f.apply(&mut driver), 2);
        let rot = f.pose.local(shoulder).unwrap().rotation;
        assert!(rot.angle_between(Quat::from_rotation_z(-0.5)) < 1e-4);

        // 骨骼数量不匹配的叠加层被跳过
        driver.clear_source();
        driver.push(ActivityOverlay::new(2, OverlayDelta::Pose(SkeletonPose::new(3))), 0.0);
        assert_eq!(f.apply(&mut driver), 1);
    }
}
