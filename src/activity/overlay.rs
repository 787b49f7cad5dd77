//! 叠加层：标识、遮罩、权重、姿势增量

use std::f32::consts::TAU;

use glam::Vec3;

use crate::ik::{arc_between, limit_rotation, scale_rotation, IkSystem};
use crate::locomotion::LocomotionDriver;
use crate::pose::{BoneMask, SkeletonPose};
use crate::skeleton::Skeleton;
use crate::Result;

/// 叠加层标识
pub type ActivityId = u32;

/// 叠加层的姿势增量
#[derive(Clone, Debug)]
pub enum OverlayDelta {
    /// 绝对姿势：遮罩内骨骼向该姿势插值
    Pose(SkeletonPose),
    /// 加算姿势：相对 `bind` 的增量叠加到当前姿势
    Additive { pose: SkeletonPose, bind: SkeletonPose },
    /// 注视：朝 IK 系统的注视目标转动，从颈到头依次分摊，总角度不超过 `max_angle`
    Gaze { bones: Vec<usize>, max_angle: f32 },
    /// 呼吸：周期性缩放胸部，运动越剧烈幅度越大
    Breathe { bone: usize, rate: f32, amount: f32 },
}

impl OverlayDelta {
    /// 增量涉及的骨骼
    pub fn default_mask(&self) -> BoneMask {
        match self {
            Self::Pose(pose) | Self::Additive { pose, .. } => BoneMask::all(pose.len()),
            Self::Gaze { bones, .. } => BoneMask::from_bones(bones),
            Self::Breathe { bone, .. } => BoneMask::from_bones(&[*bone]),
        }
    }
}

/// 活动叠加层
#[derive(Clone, Debug)]
pub struct ActivityOverlay {
    pub id: ActivityId,
    pub mask: BoneMask,
    /// 混合权重 [0, 1]
    pub weight: f32,
    /// 优先级高的后施加
    pub priority: i32,
    pub delta: OverlayDelta,
}

impl ActivityOverlay {
    /// 遮罩取增量涉及的全部骨骼，权重 1，优先级 0
    pub fn new(id: ActivityId, delta: OverlayDelta) -> Self {
        Self {
            id,
            mask: delta.default_mask(),
            weight: 1.0,
            priority: 0,
            delta,
        }
    }

    pub fn with_mask(mut self, mask: BoneMask) -> Self {
        self.mask = mask;
        self
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight.clamp(0.0, 1.0);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// 外部活动状态机
///
/// 每帧提供一组稳定的叠加层，驱动器按优先级与内部叠加层合并。
pub trait ActivitySource: Send {
    /// 每帧在叠加层被读取前调用一次
    fn update(&mut self, _dt: f32) {}

    fn overlays(&self) -> &[ActivityOverlay];
}

/// 施加叠加层时可读取的只读状态
pub(crate) struct OverlayContext<'a> {
    pub skeleton: &'a Skeleton,
    pub locomotion: &'a LocomotionDriver,
    pub ik: &'a IkSystem,
    /// 活动驱动器的累计时间
    pub time: f32,
}

impl OverlayDelta {
    /// 以权重 `weight` 把增量施加到遮罩内骨骼
    pub(crate) fn apply(&self, mask: &BoneMask, weight: f32, ctx: &OverlayContext<'_>, pose: &mut SkeletonPose) -> Result<()> {
        match self {
            Self::Pose(target) => pose.blend_masked(target, weight, mask),
            Self::Additive { pose: overlay, bind } => pose.additive_masked(overlay, bind, weight, mask),
            Self::Gaze { bones, max_angle } => {
                apply_gaze(bones, *max_angle, mask, weight, ctx, pose);
                Ok(())
            }
            Self::Breathe { bone, rate, amount } => {
                if !mask.contains(*bone) {
                    return Ok(());
                }
                let exertion = 1.0 + ctx.locomotion.speed_factor();
                let s = (TAU * rate * ctx.time).sin() * amount * exertion * weight;
                if let Some(local) = pose.local_mut(*bone) {
                    local.scale *= Vec3::new(1.0 + s, 1.0, 1.0 + s);
                }
                Ok(())
            }
        }
    }
}

/// 注视：每根骨骼的前向 (+Z) 转向目标，第 k 根承担剩余偏差的 1/(n-k)
fn apply_gaze(
    bones: &[usize],
    max_angle: f32,
    mask: &BoneMask,
    weight: f32,
    ctx: &OverlayContext<'_>,
    pose: &mut SkeletonPose,
) {
    let Some(look) = ctx.ik.look_at() else {
        return;
    };
    let w = weight * look.weight;
    let len = pose.len();
    let active = || bones.iter().copied().filter(|&b| b < len && mask.contains(b));
    let n = active().count();
    if w <= 0.0 || n == 0 {
        return;
    }

    let per_bone = max_angle.max(0.0) / n as f32;
    pose.calculate_global_transforms(ctx.skeleton);
    for (k, bone) in active().enumerate() {
        let share = 1.0 / (n - k) as f32;
        let forward = pose.global_rotation(bone) * Vec3::Z;
        let to_target = look.position - pose.global_position(bone);
        let Some(arc) = arc_between(forward, to_target) else {
            continue;
        };
        let delta = limit_rotation(scale_rotation(arc, share * w), per_bone);
        pose.rotate_global(ctx.skeleton, bone, delta);
        pose.calculate_global_transforms_from(ctx.skeleton, bone);
    }
}
