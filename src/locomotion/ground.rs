//! 地面探测
//!
//! 探测函数由调用者提供：`(起点, 方向, 最大距离) → 可选(命中点, 法线)`。
//! 未命中或返回无效数据时退回到 y = 0 的平地。

use glam::Vec3;

/// 地面命中
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroundHit {
    pub point: Vec3,
    pub normal: Vec3,
}

impl GroundHit {
    pub fn new(point: Vec3, normal: Vec3) -> Self {
        Self { point, normal }
    }

    /// 点和法线都是有限值且法线非零
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.point.is_finite() && self.normal.is_finite() && self.normal.length_squared() > 1e-8
    }
}

/// 地面探测接口
pub trait GroundProbe {
    fn probe(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<GroundHit>;
}

/// 闭包即探测函数
impl<F> GroundProbe for F
where
    F: Fn(Vec3, Vec3, f32) -> Option<GroundHit>,
{
    #[inline]
    fn probe(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<GroundHit> {
        self(origin, direction, max_distance)
    }
}

/// 水平无限平面
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FlatGround {
    pub height: f32,
}

impl FlatGround {
    pub fn new(height: f32) -> Self {
        Self { height }
    }
}

impl GroundProbe for FlatGround {
    fn probe(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<GroundHit> {
        // 射线与 y = height 平面求交
        if direction.y.abs() < 1e-6 {
            return None;
        }
        let t = (self.height - origin.y) / direction.y;
        if t < 0.0 || t * direction.length() > max_distance {
            return None;
        }
        let mut point = origin + direction * t;
        point.y = self.height;
        Some(GroundHit::new(point, Vec3::Y))
    }
}

/// 以 `point` 上方 `height` 处垂直向下探测，失败时退回平地
pub(crate) fn sample_ground(probe: &dyn GroundProbe, point: Vec3, height: f32, distance: f32) -> GroundHit {
    let origin = point + Vec3::Y * height;
    match probe.probe(origin, Vec3::NEG_Y, height + distance) {
        Some(hit) if hit.is_valid() => GroundHit::new(hit.point, hit.normal.normalize()),
        _ => {
            log::trace!("[Locomotion] 地面探测未命中 ({point})，使用平地");
            GroundHit::new(Vec3::new(point.x, 0.0, point.z), Vec3::Y)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_ground_hits_below() {
        let g = FlatGround::new(0.2);
        let hit = g.probe(Vec3::new(1.0, 2.0, 3.0), Vec3::NEG_Y, 5.0).unwrap();
        assert!(hit.point.abs_diff_eq(Vec3::new(1.0, 0.2, 3.0), 1e-6));
        assert_eq!(hit.normal, Vec3::Y);
        // 超出距离
        assert!(g.probe(Vec3::new(0.0, 10.0, 0.0), Vec3::NEG_Y, 1.0).is_none());
        // 向上
        assert!(g.probe(Vec3::new(0.0, 1.0, 0.0), Vec3::Y, 5.0).is_none());
    }

    #[test]
    fn test_closure_probe_and_fallback() {
        let slope = |origin: Vec3, _dir: Vec3, _max: f32| {
            Some(GroundHit::new(Vec3::new(origin.x, 0.5, origin.z), Vec3::new(0.0, 1.0, 1.0)))
        };
        let hit = sample_ground(&slope, Vec3::new(1.0, 1.0, 0.0), 1.0, 2.0);
        assert!((hit.point.y - 0.5).abs() < 1e-6);
        assert!((hit.normal.length() - 1.0).abs() < 1e-6);

        let miss = |_: Vec3, _: Vec3, _: f32| -> Option<GroundHit> { None };
        let hit = sample_ground(&miss, Vec3::new(1.0, 3.0, 2.0), 1.0, 2.0);
        assert_eq!(hit.point, Vec3::new(1.0, 0.0, 2.0));
        assert_eq!(hit.normal, Vec3::Y);

        let broken = |_: Vec3, _: Vec3, _: f32| Some(GroundHit::new(Vec3::splat(f32::NAN), Vec3::Y));
        assert_eq!(sample_ground(&broken, Vec3::ZERO, 1.0, 2.0).point, Vec3::ZERO);
    }
}
