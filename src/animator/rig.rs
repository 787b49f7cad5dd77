//! 生物装配
//!
//! 工厂骨架加上对应形态的脚、翅膀、脊柱、游泳配置，
//! 交给 [`CreatureAnimator::from_rig`](super::CreatureAnimator::from_rig) 使用。

use glam::Vec3;
use rand::Rng;

use crate::locomotion::{FootConfig, GaitType};
use crate::oscillator::{SpineConfig, SwimConfig, SwimStyle, WingConfig};
use crate::skeleton::{Morphology, Skeleton, SkeletonFactory, SIDES};
use crate::Result;

/// 生物装配
#[derive(Clone, Debug)]
pub struct CreatureRig {
    pub morphology: Morphology,
    pub skeleton: Skeleton,
    pub feet: Vec<FootConfig>,
    pub wings: Vec<WingConfig>,
    pub spine: Option<SpineConfig>,
    pub swim: Option<SwimConfig>,
    pub gait: GaitType,
    /// 注视时转动的骨骼（颈 → 头）
    pub gaze_bones: Vec<usize>,
    /// 呼吸缩放的胸部骨骼
    pub chest: Option<usize>,
    /// 两栖：可在游泳与行走之间混合
    pub amphibious: bool,
}

impl CreatureRig {
    fn bare(morphology: Morphology, skeleton: Skeleton, gait: GaitType) -> Self {
        Self {
            morphology,
            skeleton,
            feet: Vec::new(),
            wings: Vec::new(),
            spine: None,
            swim: None,
            gait,
            gaze_bones: Vec::new(),
            chest: None,
            amphibious: false,
        }
    }

    fn with_head(mut self, neck: &str, head: &str, chest: &str) -> Result<Self> {
        self.gaze_bones = vec![self.skeleton.require_bone(neck)?, self.skeleton.require_bone(head)?];
        self.chest = Some(self.skeleton.require_bone(chest)?);
        Ok(self)
    }

    /// 双足：两条腿，抬脚 0.15·身高，步幅 0.3·身高，膝盖朝前
    pub fn biped(height: f32) -> Result<Self> {
        let skeleton = SkeletonFactory::biped(height)?;
        let mut rig = Self::bare(Morphology::Biped, skeleton, GaitType::Walk).with_head("neck", "head", "spine_03")?;
        for (side, x) in SIDES {
            let foot = FootConfig::from_names(
                &rig.skeleton,
                [&format!("hip_{side}"), &format!("knee_{side}"), &format!("ankle_{side}"), &format!("foot_{side}")],
            )?
            .with_step(0.15 * height, 0.3 * height)
            .with_knee_pole(Vec3::new(x * 0.09 * height, 0.25 * height, height));
            rig.feet.push(foot);
        }
        Ok(rig)
    }

    /// 四足：脚顺序 前左、前右、后左、后右；尾巴随速度摆动
    pub fn quadruped(size: f32) -> Result<Self> {
        let skeleton = SkeletonFactory::quadruped(size)?;
        let mut rig =
            Self::bare(Morphology::Quadruped, skeleton, GaitType::Walk).with_head("neck", "head", "spine_02")?;
        let legs = [
            ["shoulder_fl", "elbow_fl", "wrist_fl", "paw_fl"],
            ["shoulder_fr", "elbow_fr", "wrist_fr", "paw_fr"],
            ["hip_hl", "knee_hl", "hock_hl", "paw_hl"],
            ["hip_hr", "knee_hr", "hock_hr", "paw_hr"],
        ];
        for names in legs {
            let foot = FootConfig::from_names(&rig.skeleton, names)?.with_step(0.15 * size, 0.4 * size);
            rig.feet.push(foot);
        }
        let mut tail = SpineConfig::from_chain(&rig.skeleton, "tail_01", "tail_03")?;
        tail.wave_magnitude = 0.1;
        rig.spine = Some(tail);
        Ok(rig)
    }

    /// 蛇形：无脚，整条脊柱波动，爬行步态
    pub fn serpent(length: f32, segments: usize) -> Result<Self> {
        let skeleton = SkeletonFactory::serpentine(length, segments)?;
        let last = format!("spine_{:02}", segments - 1);
        let spine = SpineConfig::from_chain(&skeleton, "spine_00", &last)?;
        let mut rig = Self::bare(Morphology::Serpentine, skeleton, GaitType::Crawl);
        rig.gaze_bones = vec![rig.skeleton.require_bone("head")?];
        rig.spine = Some(spine);
        Ok(rig)
    }

    /// 飞行：双翼对称扇动，退化的双腿在落地行走时使用
    pub fn flier(wingspan: f32) -> Result<Self> {
        let skeleton = SkeletonFactory::flying(wingspan)?;
        let mut rig = Self::bare(Morphology::Flying, skeleton, GaitType::Fly).with_head("neck", "head", "chest")?;
        for (side, sign) in SIDES {
            let wing = WingConfig::from_names(
                &rig.skeleton,
                [
                    &format!("wing_shoulder_{side}"),
                    &format!("wing_elbow_{side}"),
                    &format!("wing_wrist_{side}"),
                    &format!("wing_tip_{side}"),
                ],
                sign,
            )?;
            rig.wings.push(wing);
            let foot = FootConfig::from_names(
                &rig.skeleton,
                [
                    &format!("leg_hip_{side}"),
                    &format!("leg_knee_{side}"),
                    &format!("leg_ankle_{side}"),
                    &format!("leg_foot_{side}"),
                ],
            )?
            .with_step(0.05 * wingspan, 0.1 * wingspan);
            rig.feet.push(foot);
        }
        let mut tail = SpineConfig::from_chain(&rig.skeleton, "tail_01", "tail_03")?;
        tail.wave_magnitude = 0.05;
        rig.spine = Some(tail);
        Ok(rig)
    }

    /// 鱼：鲹科式身体波，尾鳍、背鳍、两片胸鳍
    pub fn fish(length: f32, segments: usize, rng: &mut impl Rng) -> Result<Self> {
        let skeleton = SkeletonFactory::aquatic(length, segments)?;
        let mut body = (0..segments)
            .map(|k| skeleton.require_bone(&format!("body_{k:02}")))
            .collect::<Result<Vec<_>>>()?;
        body.push(skeleton.require_bone("tail_base")?);

        let mut swim = SwimConfig::new(body, SwimStyle::Carangiform, rng);
        swim.tail_fin = Some(skeleton.require_bone("tail_fin")?);
        swim.dorsal_fin = Some(skeleton.require_bone("dorsal_fin")?);
        for (side, sign) in SIDES {
            swim.pectoral_fins.push((skeleton.require_bone(&format!("pectoral_{side}"))?, sign));
        }

        let mut rig = Self::bare(Morphology::Aquatic, skeleton, GaitType::Swim);
        rig.gaze_bones = vec![rig.skeleton.require_bone("head")?];
        rig.swim = Some(swim);
        Ok(rig)
    }

    /// 两栖：四足骨架，额外带鳗鲡式游泳配置，默认在陆地行走
    pub fn amphibian(size: f32, rng: &mut impl Rng) -> Result<Self> {
        let mut rig = Self::quadruped(size)?;
        let names = ["spine_03", "spine_02", "spine_01", "pelvis", "tail_01", "tail_02", "tail_03"];
        let body = names
            .iter()
            .map(|n| rig.skeleton.require_bone(n))
            .collect::<Result<Vec<_>>>()?;
        let mut swim = SwimConfig::new(body, SwimStyle::Anguilliform, rng);
        swim.reference_speed = size;
        swim.body_wave_amplitude = 0.25;
        rig.swim = Some(swim);
        rig.amphibious = true;
        Ok(rig)
    }

    /// 按形态构建，分段型形态使用默认分段数，水生形态使用 `rng` 生成相位抖动
    pub fn build(morphology: Morphology, size: f32, rng: &mut impl Rng) -> Result<Self> {
        match morphology {
            Morphology::Biped => Self::biped(size),
            Morphology::Quadruped => Self::quadruped(size),
            Morphology::Serpentine => Self::serpent(size, SkeletonFactory::DEFAULT_SEGMENTS),
            Morphology::Flying => Self::flier(size),
            Morphology::Aquatic => Self::fish(size, SkeletonFactory::DEFAULT_SEGMENTS, rng),
        }
    }
}
