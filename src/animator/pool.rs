//! 批量更新
//!
//! 动画器之间不共享任何状态，可以在线程池中并行推进。

use rayon::iter::{IntoParallelRefMutIterator, ParallelIterator};

use super::CreatureAnimator;

/// 并行推进一组动画器，结果与逐个调用 `update(dt)` 相同
pub fn update_animators(animators: &mut [CreatureAnimator], dt: f32) {
    animators.par_iter_mut().for_each(|animator| animator.update(dt));
}
