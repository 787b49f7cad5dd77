//! CCD 迭代 IK
//!
//! 从末端附近的关节开始向根逐个旋转，使“关节→末端”对准“关节→目标”。
//! 每步旋转经过阻尼、单步角度上限和骨骼自身的关节限制。
//! 距离不再下降时恢复到最佳结果并提前结束。

use super::{arc_between, blend_with_original, check_weight, limit_rotation, scale_rotation, validate_chain};
use super::{IkConfig, IkScratch, IkSolution, IkTarget};
use crate::pose::SkeletonPose;
use crate::skeleton::Skeleton;
use crate::{CreatureError, Result};

/// 求解 CCD
///
/// 目标超出链总长时返回 `UnreachableTarget`，姿势保持不变。
pub fn solve_ccd(
    skeleton: &Skeleton,
    pose: &mut SkeletonPose,
    chain: &[usize],
    target: &IkTarget,
    config: &IkConfig,
    scratch: &mut IkScratch,
) -> Result<IkSolution> {
    validate_chain(skeleton, pose, chain)?;
    let weight = check_weight(target)?;

    pose.calculate_global_transforms(skeleton);
    scratch.clear();
    for &bone in chain {
        scratch.positions.push(pose.global_position(bone));
        scratch.original.push(pose.locals()[bone]);
    }

    let total: f32 = scratch
        .positions
        .windows(2)
        .map(|p| p[0].distance(p[1]))
        .sum();
    let goal = target.position;
    let base_distance = scratch.positions[0].distance(goal);
    if base_distance > total + config.tolerance {
        return Err(CreatureError::UnreachableTarget {
            distance: base_distance,
            reach: total,
        });
    }

    let end = chain[chain.len() - 1];
    let mut best_distance = pose.global_position(end).distance(goal);
    scratch.best.extend_from_slice(&scratch.original);
    let mut iterations = 0;

    while iterations < config.max_iterations && best_distance > config.tolerance {
        iterations += 1;

        for &bone in chain[..chain.len() - 1].iter().rev() {
            let joint = pose.global_position(bone);
            let effector = pose.global_position(end);
            let Some(delta) = arc_between(effector - joint, goal - joint) else {
                continue;
            };
            let delta = limit_rotation(scale_rotation(delta, config.damping), config.max_step_angle);
            pose.rotate_global(skeleton, bone, delta);

            // 关节限制
            if let Some(limits) = skeleton.bone(bone).and_then(|b| b.limits) {
                if let Some(local) = pose.local_mut(bone) {
                    local.rotation = limits.clamp_rotation(local.rotation);
                }
            }
            pose.calculate_global_transforms_from(skeleton, bone);
        }

        let distance = pose.global_position(end).distance(goal);
        if distance < best_distance {
            best_distance = distance;
            for (slot, &bone) in scratch.best.iter_mut().zip(chain) {
                *slot = pose.locals()[bone];
            }
        } else {
            // 恢复最佳结果并退出
            for (best, &bone) in scratch.best.iter().zip(chain) {
                if let Some(local) = pose.local_mut(bone) {
                    *local = *best;
                }
            }
            pose.calculate_global_transforms_from(skeleton, chain[0]);
            break;
        }
    }

    blend_with_original(pose, chain, &scratch.original, weight);
    pose.calculate_global_transforms_from(skeleton, chain[0]);

    Ok(IkSolution {
        iterations,
        distance: pose.global_position(end).distance(goal),
        extended: false,
    })
}
