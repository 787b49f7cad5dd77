//! 步态：类型、时序预设、相位时钟

/// 静止判定速度
pub const STILL_SPEED: f32 = 0.01;
/// 有效周期下限（秒）
pub const MIN_CYCLE: f32 = 0.2;
/// 有效周期上限（秒）
pub const MAX_CYCLE: f32 = 2.0;

/// 步态类型
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GaitType {
    #[default]
    Walk,
    Trot,
    Canter,
    Gallop,
    Crawl,
    Fly,
    Swim,
    Hover,
    /// 使用调用者提供的时序
    Custom,
}

impl GaitType {
    /// 该步态下腿部是否着地行走
    #[inline]
    pub fn uses_legs(self) -> bool {
        !matches!(self, GaitType::Fly | GaitType::Swim | GaitType::Hover)
    }

    /// 翅膀是否扇动
    #[inline]
    pub fn flaps_wings(self) -> bool {
        matches!(self, GaitType::Fly | GaitType::Hover)
    }
}

// ============================================================================
// 步态时序
// ============================================================================

/// 步态时序
#[derive(Clone, Debug, PartialEq)]
pub struct GaitTiming {
    /// 基准周期（秒）
    pub cycle_time: f32,
    /// 着地占比 [0, 1]
    pub duty_factor: f32,
    /// 每只脚的相位偏移 [0, 1)
    pub phase_offsets: Vec<f32>,
}

impl Default for GaitTiming {
    fn default() -> Self {
        Self::preset(GaitType::Walk, 2)
    }
}

impl GaitTiming {
    /// 创建时序，超出范围的参数被夹紧
    pub fn new(cycle_time: f32, duty_factor: f32, phase_offsets: Vec<f32>) -> Self {
        let mut timing = Self { cycle_time, duty_factor, phase_offsets };
        timing.sanitize();
        timing
    }

    fn sanitize(&mut self) {
        if !(self.cycle_time.is_finite() && self.cycle_time > 0.0) {
            log::warn!("[Locomotion] 无效的步态周期 {}，使用 1.0", self.cycle_time);
            self.cycle_time = 1.0;
        }
        if !(0.0..=1.0).contains(&self.duty_factor) {
            log::warn!("[Locomotion] 着地占比 {} 超出 [0, 1]", self.duty_factor);
            self.duty_factor = self.duty_factor.clamp(0.0, 1.0);
        }
        for offset in &mut self.phase_offsets {
            *offset = offset.rem_euclid(1.0);
        }
    }

    /// 按步态和脚数量生成预设
    ///
    /// 四足脚序为 前左、前右、后左、后右。
    pub fn preset(gait: GaitType, foot_count: usize) -> Self {
        let n = foot_count;
        let alternating = || (0..n).map(|i| (i % 2) as f32 * 0.5).collect::<Vec<_>>();
        let quad = n == 4;

        let (cycle, duty, offsets) = match gait {
            GaitType::Walk if quad => (1.2, 0.75, vec![0.0, 0.5, 0.75, 0.25]),
            GaitType::Walk => (1.0, 0.6, alternating()),
            // 对角线成对
            GaitType::Trot if quad => (0.8, 0.5, vec![0.0, 0.5, 0.5, 0.0]),
            GaitType::Trot => (0.8, 0.45, alternating()),
            GaitType::Canter if quad => (0.7, 0.4, vec![0.33, 0.66, 0.0, 0.33]),
            GaitType::Canter => (0.7, 0.4, alternating()),
            GaitType::Gallop if quad => (0.6, 0.35, vec![0.0, 0.1, 0.5, 0.6]),
            GaitType::Gallop => (0.6, 0.35, (0..n).map(|i| (i % 2) as f32 * 0.1).collect()),
            GaitType::Crawl => (1.5, 0.8, (0..n).map(|i| i as f32 / n.max(1) as f32).collect()),
            // 脚不参与行走：全程“着地”，权重由驱动器置零
            GaitType::Fly | GaitType::Swim | GaitType::Hover | GaitType::Custom => {
                (1.0, 1.0, vec![0.0; n])
            }
        };
        Self::new(cycle, duty, offsets)
    }

    /// 第 `foot` 只脚的相位偏移，缺省为 0
    #[inline]
    pub fn offset(&self, foot: usize) -> f32 {
        self.phase_offsets.get(foot).copied().unwrap_or(0.0)
    }

    /// 给定速度下的有效周期
    #[inline]
    pub fn effective_cycle(&self, speed: f32) -> f32 {
        (self.cycle_time / (speed + 0.1)).clamp(MIN_CYCLE, MAX_CYCLE)
    }

    /// 脚相位是否处于支撑期
    #[inline]
    pub fn is_stance(&self, foot_phase: f32) -> bool {
        foot_phase >= 1.0 - self.duty_factor
    }
}

// ============================================================================
// 相位时钟
// ============================================================================

/// 步态相位时钟
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GaitClock {
    /// 当前相位 [0, 1)
    phase: f32,
    /// 累计时间（秒）
    elapsed: f32,
    /// 上一帧是否静止
    still: bool,
}

impl GaitClock {
    pub fn new() -> Self {
        Self { still: true, ..Self::default() }
    }

    /// 推进相位，返回是否在移动
    pub fn advance(&mut self, dt: f32, speed: f32, timing: &GaitTiming) -> bool {
        self.elapsed += dt;
        self.still = speed < STILL_SPEED;
        if !self.still {
            self.phase = (self.phase + dt / timing.effective_cycle(speed)).rem_euclid(1.0);
        }
        !self.still
    }

    #[inline]
    pub fn phase(&self) -> f32 {
        self.phase
    }

    #[inline]
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    #[inline]
    pub fn is_still(&self) -> bool {
        self.still
    }

    /// 某只脚的有效相位
    #[inline]
    pub fn foot_phase(&self, offset: f32) -> f32 {
        (self.phase + offset).rem_euclid(1.0)
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
