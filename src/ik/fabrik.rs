//! FABRIK 迭代 IK
//!
//! 在位置空间迭代：前向把末端放到目标再逐段回推，后向把根钉回原位再逐段前推，
//! 段长始终保持不变。最后把每段方向转换回相对父骨骼的本地旋转。

use glam::{Quat, Vec3};

use super::{arc_between, blend_with_original, check_weight, validate_chain};
use super::{IkConfig, IkScratch, IkSolution, IkTarget, EPSILON};
use crate::pose::SkeletonPose;
use crate::skeleton::Skeleton;
use crate::{CreatureError, Result};

/// 相邻两段之间的夹角范围（弧度，0 表示伸直）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AngleRange {
    pub min: f32,
    pub max: f32,
}

impl AngleRange {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min: min.min(max).max(0.0), max: min.max(max) }
    }
}

/// 求解 FABRIK
///
/// `chain` 按根到末端排列，相邻骨骼必须是父子关系。
/// 目标超出链总长时返回 `UnreachableTarget`，姿势保持不变。
pub fn solve_fabrik(
    skeleton: &Skeleton,
    pose: &mut SkeletonPose,
    chain: &[usize],
    target: &IkTarget,
    config: &IkConfig,
    scratch: &mut IkScratch,
) -> Result<IkSolution> {
    solve(skeleton, pose, chain, target, config, scratch, None)
}

/// 带关节角度约束的 FABRIK
///
/// `constraints[k]` 限制 `chain[k + 1]` 处两段之间的夹角，缺省的关节不受约束。
pub fn solve_fabrik_constrained(
    skeleton: &Skeleton,
    pose: &mut SkeletonPose,
    chain: &[usize],
    target: &IkTarget,
    constraints: &[AngleRange],
    config: &IkConfig,
    scratch: &mut IkScratch,
) -> Result<IkSolution> {
    solve(skeleton, pose, chain, target, config, scratch, Some(constraints))
}

fn solve(
    skeleton: &Skeleton,
    pose: &mut SkeletonPose,
    chain: &[usize],
    target: &IkTarget,
    config: &IkConfig,
    scratch: &mut IkScratch,
    constraints: Option<&[AngleRange]>,
) -> Result<IkSolution> {
    validate_chain(skeleton, pose, chain)?;
    let weight = check_weight(target)?;

    pose.calculate_global_transforms(skeleton);
    scratch.clear();
    for &bone in chain {
        scratch.positions.push(pose.global_position(bone));
        scratch.original.push(pose.locals()[bone]);
    }

    let n = chain.len();
    for i in 0..n - 1 {
        let d = scratch.positions[i].distance(scratch.positions[i + 1]);
        if d < EPSILON {
            return Err(CreatureError::DegenerateChain(format!(
                "zero-length segment at bone {}",
                chain[i]
            )));
        }
        scratch.lengths.push(d);
    }

    let total: f32 = scratch.lengths.iter().sum();
    let base = scratch.positions[0];
    let goal = target.position;
    let base_distance = base.distance(goal);
    if base_distance > total + config.tolerance {
        return Err(CreatureError::UnreachableTarget {
            distance: base_distance,
            reach: total,
        });
    }

    let positions = &mut scratch.positions;
    let lengths = &scratch.lengths;
    let mut error = positions[n - 1].distance(goal);
    let mut iterations = 0;

    while iterations < config.max_iterations && error > config.tolerance {
        iterations += 1;

        // 前向：末端钉到目标
        positions[n - 1] = goal;
        for i in (0..n - 1).rev() {
            let d = direction(positions[i] - positions[i + 1], Vec3::NEG_Y);
            positions[i] = positions[i + 1] + d * lengths[i];
        }

        // 后向：根钉回原位
        positions[0] = base;
        for i in 0..n - 1 {
            let mut d = direction(positions[i + 1] - positions[i], Vec3::Y);
            if let (Some(ranges), true) = (constraints, i >= 1) {
                if let Some(range) = ranges.get(i - 1) {
                    let prev = direction(positions[i] - positions[i - 1], d);
                    d = clamp_bend(prev, d, range);
                }
            }
            positions[i + 1] = positions[i] + d * lengths[i];
        }

        error = positions[n - 1].distance(goal);
    }

    // 写回：每段方向转换为相对父骨骼的旋转
    for i in 0..n - 1 {
        let bone = chain[i];
        let from = pose.global_position(bone);
        let to = pose.global_position(chain[i + 1]);
        if let Some(delta) = arc_between(to - from, scratch.positions[i + 1] - from) {
            pose.rotate_global(skeleton, bone, delta);
            pose.calculate_global_transforms_from(skeleton, bone);
        }
    }

    blend_with_original(pose, chain, &scratch.original, weight);
    pose.calculate_global_transforms_from(skeleton, chain[0]);

    Ok(IkSolution {
        iterations,
        distance: pose.global_position(chain[n - 1]).distance(goal),
        extended: false,
    })
}

#[inline]
fn direction(v: Vec3, fallback: Vec3) -> Vec3 {
    let d = v.normalize_or_zero();
    if d == Vec3::ZERO {
        fallback.normalize_or_zero()
    } else {
        d
    }
}

/// 把 `dir` 相对 `prev` 的夹角限制到范围内
fn clamp_bend(prev: Vec3, dir: Vec3, range: &AngleRange) -> Vec3 {
    let angle = prev.angle_between(dir);
    if angle.is_nan() || (angle >= range.min && angle <= range.max) {
        return dir;
    }
    let clamped = angle.clamp(range.min, range.max);
    let mut axis = prev.cross(dir).normalize_or_zero();
    if axis == Vec3::ZERO {
        axis = prev.any_orthonormal_vector();
    }
    (Quat::from_axis_angle(axis, clamped) * prev).normalize_or_zero()
}
