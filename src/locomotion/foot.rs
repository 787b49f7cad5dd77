//! 脚部：配置、落脚点、摆动/支撑状态

use std::f32::consts::PI;

use glam::{Quat, Vec3};

use super::ground::{sample_ground, GroundProbe};
use crate::ik::IkHandle;
use crate::skeleton::Skeleton;
use crate::{CreatureError, Result};

/// 单条腿配置
#[derive(Clone, Debug, PartialEq)]
pub struct FootConfig {
    pub hip: usize,
    pub knee: usize,
    pub ankle: usize,
    /// 脚尖（对齐地面时使用）
    pub foot_end: usize,
    /// 身体空间中的静止落脚点（地面高度）
    pub rest_offset: Vec3,
    /// 踝关节离地高度
    pub ankle_height: f32,
    pub lift_height: f32,
    pub step_length: f32,
    /// 叠加在步态相位偏移上的额外偏移 [0, 1)
    pub phase_offset: f32,
    /// 膝盖极向量（身体空间）
    pub knee_pole: Option<Vec3>,
}

impl FootConfig {
    /// 从绑定姿势推导静止落脚点：踝关节正下方的地面
    pub fn new(skeleton: &Skeleton, hip: usize, knee: usize, ankle: usize, foot_end: usize) -> Result<Self> {
        for bone in [hip, knee, ankle, foot_end] {
            if bone >= skeleton.len() {
                return Err(CreatureError::BoneOutOfRange { index: bone, len: skeleton.len() });
            }
        }
        if skeleton.parent(knee) != Some(hip) || skeleton.parent(ankle) != Some(knee) {
            return Err(CreatureError::InvalidConfig(format!(
                "leg bones {hip}/{knee}/{ankle} are not a parent chain"
            )));
        }
        let ankle_pos = skeleton.bind_position(ankle);
        Ok(Self {
            hip,
            knee,
            ankle,
            foot_end,
            rest_offset: Vec3::new(ankle_pos.x, 0.0, ankle_pos.z),
            ankle_height: ankle_pos.y,
            lift_height: 0.1,
            step_length: 0.3,
            phase_offset: 0.0,
            knee_pole: None,
        })
    }

    /// 按骨骼名称查找（髋、膝、踝、脚尖）
    pub fn from_names(skeleton: &Skeleton, names: [&str; 4]) -> Result<Self> {
        Self::new(
            skeleton,
            skeleton.require_bone(names[0])?,
            skeleton.require_bone(names[1])?,
            skeleton.require_bone(names[2])?,
            skeleton.require_bone(names[3])?,
        )
    }

    pub fn with_step(mut self, lift_height: f32, step_length: f32) -> Self {
        self.lift_height = lift_height;
        self.step_length = step_length;
        self
    }

    pub fn with_phase_offset(mut self, offset: f32) -> Self {
        self.phase_offset = offset.rem_euclid(1.0);
        self
    }

    pub fn with_knee_pole(mut self, pole: Vec3) -> Self {
        self.knee_pole = Some(pole);
        self
    }
}

/// 每帧落脚结果（世界空间）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FootPlacement {
    pub target: Vec3,
    pub normal: Vec3,
    pub grounded: bool,
    /// 摆动期为摆动进度，支撑期为支撑进度，[0, 1]
    pub step_progress: f32,
    /// IK 混合权重
    pub weight: f32,
}

impl Default for FootPlacement {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            normal: Vec3::Y,
            grounded: true,
            step_progress: 0.0,
            weight: 1.0,
        }
    }
}

// ============================================================================
// 脚部状态
// ============================================================================

/// 单帧计算所需的身体与环境信息
pub(crate) struct StepContext<'a> {
    pub body_position: Vec3,
    pub body_rotation: Quat,
    /// 水平步幅方向（单位向量）
    pub stride_dir: Vec3,
    pub foot_phase: f32,
    pub duty_factor: f32,
    pub still: bool,
    pub dt: f32,
    pub settle_rate: f32,
    pub weight: f32,
    pub probe: &'a dyn GroundProbe,
    pub probe_height: f32,
    pub probe_distance: f32,
}

impl StepContext<'_> {
    #[inline]
    fn ground(&self, point: Vec3, ankle_height: f32) -> (Vec3, Vec3) {
        let hit = sample_ground(self.probe, point, self.probe_height, self.probe_distance);
        (hit.point + Vec3::Y * ankle_height, hit.normal)
    }
}

/// 脚部内部状态
#[derive(Clone, Debug, Default)]
pub(crate) struct FootState {
    pub placement: FootPlacement,
    /// 当前（或上一次）着地点
    plant: Vec3,
    /// 本次摆动的起点
    lift_off: Vec3,
    /// 本次摆动的落点
    next_footfall: Vec3,
    swinging: bool,
    initialized: bool,
    pub chain: Option<IkHandle>,
}

impl FootState {
    pub fn reset(&mut self) {
        let chain = self.chain;
        *self = Self { chain, ..Self::default() };
    }

    pub fn update(&mut self, cfg: &FootConfig, ctx: &StepContext<'_>) {
        let rest = ctx.body_position + ctx.body_rotation * cfg.rest_offset;
        self.placement.weight = ctx.weight;

        if !self.initialized {
            let (point, normal) = ctx.ground(rest, cfg.ankle_height);
            self.plant = point;
            self.lift_off = point;
            self.next_footfall = point;
            self.placement.normal = normal;
            self.initialized = true;
        }

        if ctx.still {
            // 站立时缓慢回到静止落脚点
            let (goal, normal) = ctx.ground(rest, cfg.ankle_height);
            let k = 1.0 - (-ctx.settle_rate * ctx.dt).exp();
            self.plant = self.plant.lerp(goal, k.clamp(0.0, 1.0));
            self.lift_off = self.plant;
            self.next_footfall = self.plant;
            self.swinging = false;
            self.placement.target = self.plant;
            self.placement.normal = normal;
            self.placement.grounded = true;
            self.placement.step_progress = 0.0;
            return;
        }

        let swing_span = 1.0 - ctx.duty_factor;
        let footfall = rest + ctx.stride_dir * (cfg.step_length * 0.5);

        if swing_span > 1e-6 && ctx.foot_phase < swing_span {
            let progress = ctx.foot_phase / swing_span;
            if !self.swinging {
                self.swinging = true;
                self.lift_off = self.plant;
            }
            let (next, normal) = ctx.ground(footfall, cfg.ankle_height);
            self.next_footfall = next;
            let arc = cfg.lift_height * (PI * progress).sin();
            self.placement.target = self.lift_off.lerp(next, progress) + Vec3::Y * arc;
            self.placement.normal = normal;
            self.placement.grounded = false;
            self.placement.step_progress = progress;
        } else {
            if self.swinging {
                // 落地：以本帧的落点作为新的着地点
                let (next, normal) = ctx.ground(footfall, cfg.ankle_height);
                self.next_footfall = next;
                self.plant = next;
                self.placement.normal = normal;
                self.swinging = false;
            }
            self.placement.target = self.plant;
            self.placement.grounded = true;
            self.placement.step_progress = if ctx.duty_factor > 1e-6 {
                ((ctx.foot_phase - swing_span) / ctx.duty_factor).clamp(0.0, 1.0)
            } else {
                1.0
            };
        }
    }

    #[inline]
    pub fn is_swinging(&self) -> bool {
        self.swinging
    }
}
