//! 贝塞尔缓动曲线
//!
//! 活动叠加层的淡入淡出使用三次贝塞尔曲线把线性进度映射为权重。

use glam::Vec2;

/// 曲线 trait
pub trait Curve {
    fn value(&self, v: f32) -> f32;
}

/// 三次贝塞尔曲线（端点固定为 (0,0) 与 (1,1)）
#[derive(Debug, Clone, PartialEq)]
pub struct BezierCurve {
    /// 预计算的曲线采样点，按 x 递增
    points: Vec<Vec2>,
    /// 控制点1
    c0: Vec2,
    /// 控制点2
    c1: Vec2,
}

impl BezierCurve {
    const P0: Vec2 = Vec2::ZERO;
    const P1: Vec2 = Vec2::ONE;
    const DEFAULT_INTERVAL: u32 = 64;

    /// 创建新的贝塞尔曲线
    ///
    /// # 参数
    /// - `c0`: 控制点1，x 夹紧到 [0, 1]
    /// - `c1`: 控制点2，x 夹紧到 [0, 1]
    /// - `interval`: 采样间隔数
    pub fn new(c0: Vec2, c1: Vec2, interval: u32) -> Self {
        let c0 = Vec2::new(c0.x.clamp(0.0, 1.0), c0.y);
        let c1 = Vec2::new(c1.x.clamp(0.0, 1.0), c1.y);
        let interval = interval.max(1);
        let interval_f = interval as f32;

        let mut points: Vec<Vec2> = (0..=interval)
            .map(|i| {
                let t = i as f32 / interval_f;
                let it = 1.0 - t;
                // B(t) = (1-t)³P₀ + 3(1-t)²tP₁ + 3(1-t)t²P₂ + t³P₃
                Self::P0 * it.powi(3) + c0 * 3.0 * it.powi(2) * t + c1 * 3.0 * it * t.powi(2) + Self::P1 * t.powi(3)
            })
            .collect();

        // 按 X 排序以便查找
        points.sort_unstable_by(|a, b| a.x.total_cmp(&b.x));

        Self { points, c0, c1 }
    }

    /// 线性
    pub fn linear() -> Self {
        Self::new(Vec2::new(0.25, 0.25), Vec2::new(0.75, 0.75), 1)
    }

    /// CSS 的 ease-in-out
    pub fn ease_in_out() -> Self {
        Self::new(Vec2::new(0.42, 0.0), Vec2::new(0.58, 1.0), Self::DEFAULT_INTERVAL)
    }

    pub fn ease_in() -> Self {
        Self::new(Vec2::new(0.42, 0.0), Vec2::ONE, Self::DEFAULT_INTERVAL)
    }

    pub fn ease_out() -> Self {
        Self::new(Vec2::ZERO, Vec2::new(0.58, 1.0), Self::DEFAULT_INTERVAL)
    }

    #[inline]
    pub fn control_points(&self) -> (Vec2, Vec2) {
        (self.c0, self.c1)
    }
}

impl Default for BezierCurve {
    fn default() -> Self {
        Self::ease_in_out()
    }
}

impl Curve for BezierCurve {
    /// 根据输入值计算曲线输出值
    ///
    /// 在预计算的采样点之间线性插值，输入夹紧到 [0, 1]
    fn value(&self, v: f32) -> f32 {
        let v = v.clamp(0.0, 1.0);
        let mut n = (self.points[0], self.points[1]);
        for point in &self.points[2..] {
            if n.1.x > v {
                break;
            }
            n = (n.1, *point);
        }
        if n.0.x == n.1.x {
            n.0.y
        } else {
            n.0.y + (v - n.0.x) * (n.1.y - n.0.y) / (n.1.x - n.0.x)
        }
    }
}
