//! 两骨骼解析 IK
//!
//! 上骨骼（链根）、下骨骼（铰链）、末端骨骼三点，余弦定理直接求解弯曲角。
//! 弯曲平面默认沿用当前姿势的肢体平面，启用极向量时向极点偏转。

use glam::{Quat, Vec3};

use super::{arc_between, blend_with_original, check_weight, validate_chain};
use super::{IkConfig, IkSolution, IkTarget, PoleVector, EPSILON};
use crate::pose::SkeletonPose;
use crate::skeleton::Skeleton;
use crate::{CreatureError, Result};

/// 求解两骨骼 IK
///
/// `target` 位于模型空间。目标超出 `soft_limit · (U + L)` 时肢体沿目标方向伸直，
/// 结果中 `extended` 为 true。骨骼长度为零或权重不大于零时返回错误，姿势保持不变。
#[allow(clippy::too_many_arguments)]
pub fn solve_two_bone(
    skeleton: &Skeleton,
    pose: &mut SkeletonPose,
    upper: usize,
    lower: usize,
    effector: usize,
    target: &IkTarget,
    pole: Option<&PoleVector>,
    config: &IkConfig,
) -> Result<IkSolution> {
    let chain = [upper, lower, effector];
    validate_chain(skeleton, pose, &chain)?;
    let weight = check_weight(target)?;

    pose.calculate_global_transforms(skeleton);

    let a = pose.global_position(upper);
    let b = pose.global_position(lower);
    let c = pose.global_position(effector);
    let upper_len = a.distance(b);
    let lower_len = b.distance(c);
    if upper_len < EPSILON || lower_len < EPSILON {
        return Err(CreatureError::DegenerateChain(format!(
            "zero-length segment in two-bone chain {upper}->{lower}->{effector}"
        )));
    }

    // 目标方向与距离
    let to_target = target.position - a;
    let distance = to_target.length();
    let dir = if distance > EPSILON {
        to_target / distance
    } else {
        (c - a).normalize_or_zero()
    };
    if dir == Vec3::ZERO {
        return Err(CreatureError::DegenerateChain("folded chain with target at its base".into()));
    }

    // 可达范围：软限制与最小弯曲角
    let total = upper_len + lower_len;
    let mut max_reach = total * config.soft_limit.clamp(0.5, 1.0);
    if config.min_bend_angle > 0.0 {
        let bend_reach = (upper_len * upper_len
            + lower_len * lower_len
            + 2.0 * upper_len * lower_len * config.min_bend_angle.cos())
        .max(0.0)
        .sqrt();
        max_reach = max_reach.min(bend_reach);
    }
    let min_reach = (upper_len - lower_len).abs() + total * 1e-4;
    let reach = distance.clamp(min_reach, max_reach.max(min_reach));
    let extended = distance > max_reach;

    // 上骨骼与目标方向的夹角
    let cos_upper = ((upper_len * upper_len + reach * reach - lower_len * lower_len)
        / (2.0 * upper_len * reach))
        .clamp(-1.0, 1.0);
    let angle_upper = cos_upper.acos();

    let side = bend_side(a, b, c, dir, pole);
    let b_new = a + (dir * angle_upper.cos() + side * angle_upper.sin()) * upper_len;
    let c_new = a + dir * reach;

    // 世界空间旋转增量
    let r_upper = arc_between(b - a, b_new - a).unwrap_or(Quat::IDENTITY);
    let c_moved = a + r_upper * (c - a);
    let r_lower = arc_between(c_moved - b_new, c_new - b_new).unwrap_or(Quat::IDENTITY);

    let original = [
        pose.locals()[upper],
        pose.locals()[lower],
        pose.locals()[effector],
    ];

    let parent_rot = pose.parent_global_rotation(skeleton, upper);
    let new_upper_global = r_upper * pose.global_rotation(upper);
    let new_lower_global = r_lower * r_upper * pose.global_rotation(lower);

    {
        let locals = pose.locals_mut();
        locals[upper].rotation = (parent_rot.inverse() * new_upper_global).normalize();
        locals[lower].rotation = (new_upper_global.inverse() * new_lower_global).normalize();
        if let Some(rotation) = target.rotation {
            locals[effector].rotation = (new_lower_global.inverse() * rotation).normalize();
        }
    }

    blend_with_original(pose, &chain, &original, weight);
    pose.calculate_global_transforms_from(skeleton, upper);

    let remaining = pose.global_position(effector).distance(target.position);
    Ok(IkSolution {
        iterations: 1,
        distance: remaining,
        extended,
    })
}

/// 计算弯曲方向：垂直于目标方向、位于肢体平面内并指向当前铰链一侧
fn bend_side(a: Vec3, b: Vec3, c: Vec3, dir: Vec3, pole: Option<&PoleVector>) -> Vec3 {
    let reject = |v: Vec3| v - dir * v.dot(dir);

    let mut side = reject(b - a).normalize_or_zero();
    if side == Vec3::ZERO {
        // 肢体伸直：用末端相对铰链的偏移，仍然退化则取任意垂直方向
        side = reject(b - c).normalize_or_zero();
    }
    if side == Vec3::ZERO {
        side = dir.any_orthonormal_vector();
    }

    if let Some(pole) = pole.filter(|p| p.enabled && p.weight > 0.0) {
        let pole_side = reject(pole.position - a).normalize_or_zero();
        if pole_side != Vec3::ZERO {
            let blended = side.lerp(pole_side, pole.weight.min(1.0)).normalize_or_zero();
            side = if blended == Vec3::ZERO { pole_side } else { blended };
        }
    }
    side
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::BoneTransform;

    /// 肩在原点，上臂和前臂各长 1，沿 +X 伸直
    fn arm() -> (Skeleton, SkeletonPose) {
        let mut s = Skeleton::new();
        s.add_bone("shoulder", -1, BoneTransform::IDENTITY).unwrap();
        s.add_bone("elbow", 0, BoneTransform::from_translation(Vec3::X)).unwrap();
        s.add_bone("wrist", 1, BoneTransform::from_translation(Vec3::X)).unwrap();
        let pose = SkeletonPose::from_skeleton(&s);
        (s, pose)
    }

    #[test]
    fn test_reach_target_below() {
        let (s, mut pose) = arm();
        let target = IkTarget::at(Vec3::new(0.0, -1.5, 0.0));
        let result = solve_two_bone(&s, &mut pose, 0, 1, 2, &target, None, &IkConfig::default()).unwrap();
        assert!(!result.extended);
        let wrist = pose.global_position(2);
        assert!(wrist.distance(target.position) < 1e-3, "wrist at {wrist}");

        let shoulder = pose.global_position(0);
        let elbow = pose.global_position(1);
        assert!(elbow.y < shoulder.y && elbow.y > wrist.y);
        assert!((elbow.distance(shoulder) - 1.0).abs() < 1e-4);
        assert!((elbow.distance(wrist) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_reachable_targets_converge() {
        let targets = [
            Vec3::new(1.2, 0.8, 0.3),
            Vec3::new(-0.5, 0.5, 1.0),
            Vec3::new(0.3, -0.2, -1.6),
        ];
        for t in targets {
            let (s, mut pose) = arm();
            // 先弯曲一点，给出确定的弯曲平面
            pose.local_mut(1).unwrap().rotation = Quat::from_rotation_z(0.3);
            let cfg = IkConfig::default();
            let r = solve_two_bone(&s, &mut pose, 0, 1, 2, &IkTarget::at(t), None, &cfg).unwrap();
            assert!(r.distance < cfg.tolerance, "target {t} missed by {}", r.distance);
        }
    }

    #[test]
    fn test_unreachable_extends_toward_target() {
        let (s, mut pose) = arm();
        let target = IkTarget::at(Vec3::new(0.0, 5.0, 0.0));
        let r = solve_two_bone(&s, &mut pose, 0, 1, 2, &target, None, &IkConfig::default()).unwrap();
        assert!(r.extended);
        let wrist = pose.global_position(2);
        assert!(wrist.normalize().abs_diff_eq(Vec3::Y, 1e-3));
        assert!((wrist.length() - 2.0).abs() < 1e-2);
    }

    #[test]
    fn test_weight_blends_with_original() {
        let (s, mut pose) = arm();
        let before = pose.global_position(2);
        let target = IkTarget::at(Vec3::new(0.0, -1.5, 0.0)).with_weight(0.0);
        let err = solve_two_bone(&s, &mut pose, 0, 1, 2, &target, None, &IkConfig::default()).unwrap_err();
        assert!(matches!(err, CreatureError::InactiveTarget));
        assert_eq!(pose.global_position(2), before);

        let half = IkTarget::at(Vec3::new(0.0, -1.5, 0.0)).with_weight(0.5);
        solve_two_bone(&s, &mut pose, 0, 1, 2, &half, None, &IkConfig::default()).unwrap();
        let wrist = pose.global_position(2);
        assert!(wrist.distance(half.position) > 0.1);
        assert!(wrist.distance(before) > 0.1);
    }

    #[test]
    fn test_target_rotation_is_honoured() {
        let (s, mut pose) = arm();
        let rot = Quat::from_rotation_y(0.7);
        let target = IkTarget::at(Vec3::new(1.0, -1.0, 0.0)).with_rotation(rot);
        solve_two_bone(&s, &mut pose, 0, 1, 2, &target, None, &IkConfig::default()).unwrap();
        assert!(pose.global_rotation(2).dot(rot).abs() > 1.0 - 1e-4);
    }

    #[test]
    fn test_pole_selects_bend_plane() {
        let (s, mut pose) = arm();
        let pole = PoleVector::new(Vec3::new(0.0, 0.0, 5.0), 1.0);
        let target = IkTarget::at(Vec3::new(1.5, 0.0, 0.0));
        solve_two_bone(&s, &mut pose, 0, 1, 2, &target, Some(&pole), &IkConfig::default()).unwrap();
        let elbow = pose.global_position(1);
        assert!(elbow.z > 0.5, "elbow should bend toward the pole: {elbow}");
        assert!(elbow.y.abs() < 1e-3);
        assert!(pose.global_position(2).distance(target.position) < 1e-3);
    }

    #[test]
    fn test_degenerate_chain_rejected() {
        let mut s = Skeleton::new();
        s.add_bone("a", -1, BoneTransform::IDENTITY).unwrap();
        s.add_bone("b", 0, BoneTransform::IDENTITY).unwrap();
        s.add_bone("c", 1, BoneTransform::from_translation(Vec3::X)).unwrap();
        let mut pose = SkeletonPose::from_skeleton(&s);
        let target = IkTarget::at(Vec3::Y);
        let err = solve_two_bone(&s, &mut pose, 0, 1, 2, &target, None, &IkConfig::default()).unwrap_err();
        assert!(matches!(err, CreatureError::DegenerateChain(_)));
        let err = solve_two_bone(&s, &mut pose, 0, 2, 1, &target, None, &IkConfig::default()).unwrap_err();
        assert!(matches!(err, CreatureError::DegenerateChain(_)));
    }
}
