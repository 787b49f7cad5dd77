//! IK 链管理器
//!
//! 句柄表使用稀疏槽位 + 代数：删除链不会让其他句柄失效，
//! 旧句柄在槽位复用后也不会误指向新链。

use glam::Vec3;

use super::{solve_ccd, solve_fabrik, solve_fabrik_constrained, solve_two_bone};
use super::{AngleRange, IkConfig, IkScratch, IkSolution, IkTarget, PoleVector};
use crate::pose::SkeletonPose;
use crate::skeleton::Skeleton;
use crate::{CreatureError, Result};

/// 链使用的求解器
#[derive(Clone, Debug, PartialEq)]
pub enum ChainSolver {
    /// 解析两骨骼，链必须恰好 3 个骨骼
    TwoBone,
    Fabrik,
    /// 每个中间关节的夹角范围
    ConstrainedFabrik(Vec<AngleRange>),
    Ccd,
}

/// 链定义
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IkChainDef {
    pub start_bone: usize,
    pub end_bone: usize,
    /// 绑定姿势下的链总长
    pub length: f32,
}

/// 链条目
#[derive(Clone, Debug)]
pub struct IkChainEntry {
    pub def: IkChainDef,
    /// 根到末端的骨骼索引
    pub bones: Vec<usize>,
    pub target: IkTarget,
    pub pole: Option<PoleVector>,
    pub solver: ChainSolver,
    pub enabled: bool,
    /// 越大越先求解
    pub priority: i32,
    serial: u64,
}

/// 链句柄
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IkHandle {
    index: u32,
    generation: u32,
}

/// 注视目标（模型空间），由活动层的注视叠加读取
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LookAtTarget {
    pub position: Vec3,
    pub weight: f32,
}

#[derive(Clone, Debug, Default)]
struct Slot {
    generation: u32,
    entry: Option<IkChainEntry>,
}

/// IK 系统
#[derive(Clone, Debug, Default)]
pub struct IkSystem {
    config: IkConfig,
    slots: Vec<Slot>,
    free: Vec<u32>,
    /// 排序缓冲：(优先级, 插入序号, 槽位)
    order: Vec<(i32, u64, usize)>,
    scratch: IkScratch,
    look_at: Option<LookAtTarget>,
    next_serial: u64,
}

impl IkSystem {
    pub fn new(config: IkConfig) -> Self {
        Self { config, ..Self::default() }
    }

    #[inline]
    pub fn config(&self) -> &IkConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: IkConfig) {
        self.config = config;
    }

    // ========================================
    // 链管理
    // ========================================

    /// 添加链
    ///
    /// `start` 必须是 `end` 的祖先。新链的目标权重为 0，设置目标前不会参与求解。
    pub fn add_chain(
        &mut self,
        skeleton: &Skeleton,
        start: usize,
        end: usize,
        solver: ChainSolver,
        priority: i32,
    ) -> Result<IkHandle> {
        let bones = skeleton.chain_between(start, end).ok_or_else(|| {
            CreatureError::DegenerateChain(format!("bone {start} is not an ancestor of bone {end}"))
        })?;
        if bones.len() < 2 {
            return Err(CreatureError::DegenerateChain(format!(
                "chain {start}->{end} needs at least 2 bones"
            )));
        }
        if solver == ChainSolver::TwoBone && bones.len() != 3 {
            return Err(CreatureError::InvalidConfig(format!(
                "two-bone chain {start}->{end} has {} bones",
                bones.len()
            )));
        }

        let length = bones
            .windows(2)
            .map(|p| skeleton.bind_position(p[0]).distance(skeleton.bind_position(p[1])))
            .sum();
        let entry = IkChainEntry {
            def: IkChainDef { start_bone: start, end_bone: end, length },
            target: IkTarget::at(skeleton.bind_position(end)).with_weight(0.0),
            bones,
            pole: None,
            solver,
            enabled: true,
            priority,
            serial: self.next_serial,
        };
        self.next_serial += 1;

        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(entry);
                IkHandle { index, generation: slot.generation }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot { generation: 0, entry: Some(entry) });
                IkHandle { index, generation: 0 }
            }
        };
        log::debug!("[IK] 添加链 {start}->{end}, 优先级 {priority}");
        Ok(handle)
    }

    /// 删除链，返回被删除的条目
    pub fn remove_chain(&mut self, handle: IkHandle) -> Result<IkChainEntry> {
        self.chain(handle).ok_or(CreatureError::InvalidHandle)?;
        let slot = &mut self.slots[handle.index as usize];
        let entry = slot.entry.take().ok_or(CreatureError::InvalidHandle)?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        Ok(entry)
    }

    pub fn chain(&self, handle: IkHandle) -> Option<&IkChainEntry> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.entry.as_ref())
    }

    pub fn chain_mut(&mut self, handle: IkHandle) -> Option<&mut IkChainEntry> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.entry.as_mut())
    }

    fn entry_mut(&mut self, handle: IkHandle) -> Result<&mut IkChainEntry> {
        self.chain_mut(handle).ok_or(CreatureError::InvalidHandle)
    }

    pub fn set_target(&mut self, handle: IkHandle, target: IkTarget) -> Result<()> {
        self.entry_mut(handle)?.target = target;
        Ok(())
    }

    pub fn set_pole(&mut self, handle: IkHandle, pole: Option<PoleVector>) -> Result<()> {
        self.entry_mut(handle)?.pole = pole;
        Ok(())
    }

    pub fn set_enabled(&mut self, handle: IkHandle, enabled: bool) -> Result<()> {
        self.entry_mut(handle)?.enabled = enabled;
        Ok(())
    }

    pub fn set_priority(&mut self, handle: IkHandle, priority: i32) -> Result<()> {
        self.entry_mut(handle)?.priority = priority;
        Ok(())
    }

    /// 当前链数量
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========================================
    // 注视目标
    // ========================================

    pub fn set_look_at(&mut self, position: Vec3, weight: f32) {
        self.look_at = Some(LookAtTarget { position, weight: weight.clamp(0.0, 1.0) });
    }

    pub fn clear_look_at(&mut self) {
        self.look_at = None;
    }

    #[inline]
    pub fn look_at(&self) -> Option<&LookAtTarget> {
        self.look_at.as_ref()
    }

    // ========================================
    // 求解
    // ========================================

    /// 按优先级降序求解所有启用的链，同优先级按添加顺序
    ///
    /// 单条链失败时跳过该链，返回成功求解的链数量。
    /// 骨骼重叠时后求解的链覆盖先求解的链。
    pub fn solve(&mut self, skeleton: &Skeleton, pose: &mut SkeletonPose) -> usize {
        let Self { config, slots, order, scratch, .. } = self;

        order.clear();
        for (i, slot) in slots.iter().enumerate() {
            if let Some(entry) = slot.entry.as_ref().filter(|e| e.enabled) {
                order.push((entry.priority, entry.serial, i));
            }
        }
        order.sort_unstable_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let mut solved = 0;
        for &(_, _, i) in order.iter() {
            let Some(entry) = slots[i].entry.as_ref() else {
                continue;
            };
            match solve_entry(skeleton, pose, entry, config, scratch) {
                Ok(_) => solved += 1,
                Err(e) => log::trace!(
                    "[IK] 跳过链 {}->{}: {e}",
                    entry.def.start_bone,
                    entry.def.end_bone
                ),
            }
        }
        solved
    }
}

fn solve_entry(
    skeleton: &Skeleton,
    pose: &mut SkeletonPose,
    entry: &IkChainEntry,
    config: &IkConfig,
    scratch: &mut IkScratch,
) -> Result<IkSolution> {
    let bones = &entry.bones;
    match &entry.solver {
        ChainSolver::TwoBone => solve_two_bone(
            skeleton,
            pose,
            bones[0],
            bones[1],
            bones[2],
            &entry.target,
            entry.pole.as_ref(),
            config,
        ),
        ChainSolver::Fabrik => solve_fabrik(skeleton, pose, bones, &entry.target, config, scratch),
        ChainSolver::ConstrainedFabrik(ranges) => {
            solve_fabrik_constrained(skeleton, pose, bones, &entry.target, ranges, config, scratch)
        }
        ChainSolver::Ccd => solve_ccd(skeleton, pose, bones, &entry.target, config, scratch),
    }
}
