//! 动画器配置
//!
//! 所有参数扁平化，每个动画器持有自己的副本。

use crate::ik::IkConfig;

/// 动画器配置（扁平化，不嵌套，IK 参数除外）
#[derive(Debug, Clone, PartialEq)]
pub struct AnimatorConfig {
    // ========== IK ==========
    /// 三种求解器共享的 IK 配置
    pub ik: IkConfig,
    /// 腿部 IK 链的优先级，默认 100
    pub leg_chain_priority: i32,

    // ========== 地面探测 ==========
    /// 探测起点在落脚点上方的高度，默认 1.0
    pub ground_probe_height: f32,
    /// 探测在落脚点下方的最大距离，默认 2.0
    pub ground_probe_distance: f32,

    // ========== 脚部 ==========
    /// 站立时脚回到静止点的速率（1/秒），默认 8.0
    pub foot_settle_rate: f32,
    /// 着地的脚是否贴合地面法线，默认 true
    pub align_feet_to_ground: bool,

    // ========== 身体运动 ==========
    /// 上下起伏幅度，默认 0.02
    pub bob_amplitude: f32,
    /// 左右摇摆幅度，默认 0.01
    pub sway_amplitude: f32,
    /// 速度系数为 1 时的速度，默认 5.0
    pub speed_normalization: f32,
    /// 前向加速度到俯仰角的增益，默认 0.02
    pub pitch_gain: f32,
    /// 俯仰角上限（弧度），默认 0.1
    pub pitch_limit: f32,

    // ========== 翅膀 ==========
    /// 翅膀权重的过渡速率（1/秒），默认 4.0
    pub wing_blend_rate: f32,

    // ========== 调试 ==========
    /// 是否输出每帧调试日志，默认 false
    pub debug_log: bool,
}

impl Default for AnimatorConfig {
    fn default() -> Self {
        Self {
            // ====== IK ======
            ik: IkConfig::default(),
            // 腿部是基础层，先于其他链求解，
            // 同骨骼上后求解的链（注视、脊柱）可以覆盖
            leg_chain_priority: 100,

            // ====== 地面探测 ======
            // 从上方 1 米往下探测 3 米，覆盖台阶和缓坡
            ground_probe_height: 1.0,
            ground_probe_distance: 2.0,

            // ====== 脚部 ======
            // 约 0.3 秒回到静止点
            foot_settle_rate: 8.0,
            align_feet_to_ground: true,

            // ====== 身体运动 ======
            bob_amplitude: 0.02,
            sway_amplitude: 0.01,
            speed_normalization: 5.0,
            // 5 m/s² 的加速度达到俯仰上限
            pitch_gain: 0.02,
            pitch_limit: 0.1,

            // ====== 翅膀 ======
            wing_blend_rate: 4.0,

            // ====== 调试 ======
            debug_log: false,
        }
    }
}

impl AnimatorConfig {
    /// 检查并夹紧非法参数，返回被修正的项数
    pub fn sanitize(&mut self) -> usize {
        let mut fixed = 0;
        let mut positive = |name: &str, value: &mut f32, fallback: f32| {
            if !(value.is_finite() && *value > 0.0) {
                log::warn!("[Animator] 配置 {name} = {value} 无效，使用 {fallback}");
                *value = fallback;
                fixed += 1;
            }
        };
        let d = Self::default();
        positive("ground_probe_height", &mut self.ground_probe_height, d.ground_probe_height);
        positive("ground_probe_distance", &mut self.ground_probe_distance, d.ground_probe_distance);
        positive("foot_settle_rate", &mut self.foot_settle_rate, d.foot_settle_rate);
        positive("speed_normalization", &mut self.speed_normalization, d.speed_normalization);
        positive("wing_blend_rate", &mut self.wing_blend_rate, d.wing_blend_rate);
        positive("ik.tolerance", &mut self.ik.tolerance, d.ik.tolerance);
        positive("ik.damping", &mut self.ik.damping, d.ik.damping);
        positive("ik.soft_limit", &mut self.ik.soft_limit, d.ik.soft_limit);
        positive("ik.max_step_angle", &mut self.ik.max_step_angle, d.ik.max_step_angle);
        if self.pitch_limit < 0.0 {
            self.pitch_limit = -self.pitch_limit;
            fixed += 1;
        }
        fixed
    }
}
