//! 姿势混合：插值、加算、遮罩叠加
//!
//! 所有操作要求骨骼数量一致，否则返回 `MismatchedPoses` 且不修改姿势。

use glam::{Quat, Vec3};

use super::{BoneMask, SkeletonPose};
use crate::skeleton::BoneTransform;
use crate::Result;

impl SkeletonPose {
    /// 两个姿势逐骨骼插值，返回新姿势（矩阵未更新）
    pub fn lerp(a: &SkeletonPose, b: &SkeletonPose, t: f32) -> Result<SkeletonPose> {
        let mut out = a.clone();
        out.lerp_from(a, b, t)?;
        Ok(out)
    }

    /// 将 lerp(a, b, t) 写入自身
    pub fn lerp_from(&mut self, a: &SkeletonPose, b: &SkeletonPose, t: f32) -> Result<()> {
        a.check_shape(b)?;
        self.check_shape(a)?;
        for ((dst, la), lb) in self.locals.iter_mut().zip(&a.locals).zip(&b.locals) {
            *dst = BoneTransform::lerp(la, lb, t);
        }
        Ok(())
    }

    /// 加算混合
    ///
    /// 叠加层相对自身绑定姿势的增量按权重 `w` 施加到当前姿势上：
    /// 平移相加，旋转从单位旋转 slerp 到增量后左乘，缩放向 1 分量混合后相乘。
    pub fn additive(&mut self, overlay: &SkeletonPose, overlay_bind: &SkeletonPose, w: f32) -> Result<()> {
        let mask = BoneMask::all(self.len());
        self.additive_masked(overlay, overlay_bind, w, &mask)
    }

    /// 仅对遮罩内骨骼做加算混合
    pub fn additive_masked(
        &mut self,
        overlay: &SkeletonPose,
        overlay_bind: &SkeletonPose,
        w: f32,
        mask: &BoneMask,
    ) -> Result<()> {
        self.check_shape(overlay)?;
        self.check_shape(overlay_bind)?;

        for (i, base) in self.locals.iter_mut().enumerate() {
            if !mask.contains(i) {
                continue;
            }
            let ol = &overlay.locals[i];
            let ob = &overlay_bind.locals[i];

            let delta_translation = ol.translation - ob.translation;
            let delta_rotation = (ol.rotation * ob.rotation.conjugate()).normalize();
            let delta_scale = safe_div(ol.scale, ob.scale);

            base.translation += delta_translation * w;
            base.rotation = (Quat::IDENTITY.slerp(delta_rotation, w) * base.rotation).normalize();
            base.scale *= Vec3::ONE.lerp(delta_scale, w);
        }
        Ok(())
    }

    /// 遮罩内骨骼向 `other` 插值
    pub fn blend_masked(&mut self, other: &SkeletonPose, w: f32, mask: &BoneMask) -> Result<()> {
        self.check_shape(other)?;
        if w <= 0.0 {
            return Ok(());
        }
        for (i, (dst, src)) in self.locals.iter_mut().zip(&other.locals).enumerate() {
            if mask.contains(i) {
                *dst = BoneTransform::lerp(dst, src, w);
            }
        }
        Ok(())
    }
}

/// 分量除法，除数接近零时该分量视为 1
#[inline]
fn safe_div(a: Vec3, b: Vec3) -> Vec3 {
    let div = |x: f32, y: f32| if y.abs() > 1e-6 { x / y } else { 1.0 };
    Vec3::new(div(a.x, b.x), div(a.y, b.y), div(a.z, b.z))
}
