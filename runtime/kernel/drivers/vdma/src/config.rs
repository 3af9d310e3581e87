// Licensed under the Apache-2.0 license

use log::{debug, error};
use registers_vdma::bits::Dmacr;

use crate::chan::Channel;
use crate::error::VdmaError;

/// Runtime configuration of a channel.
///
/// Besides a full update, two sentinel values select partial updates:
/// `vsize == -1` only toggles park mode and `hsize == -1` only updates the
/// interrupt coalescing thresholds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct VdmaConfig {
    /// Reset the channel and ignore everything else.
    pub reset: bool,
    /// Lines per frame.
    pub vsize: i32,
    /// Bytes per line.
    pub hsize: i32,
    /// Bytes between the starts of two lines.
    pub stride: i32,
    pub frm_dly: u32,
    /// Park on `park_frm` instead of cycling through the frame stores.
    pub park: bool,
    pub park_frm: u32,
    pub gen_lock: bool,
    /// Genlock master index.
    pub master: u32,
    pub frm_cnt_en: bool,
    /// Frames per completion interrupt, clamped to 0..=255.
    pub coalesce: i32,
    /// Delay timer threshold, clamped to 0..=255.
    pub delay: i32,
    /// Frame sync source select.
    pub ext_fsync: u32,
}

impl VdmaConfig {
    /// `vsize` value selecting a park mode toggle.
    pub const PARK_TOGGLE: i32 = -1;
    /// `hsize` value selecting an interrupt threshold update.
    pub const THRESHOLD_ONLY: i32 = -1;

    const MAX_STRIDE: i32 = 0xffff;
    const MAX_FRM_DLY: u32 = 31;
    const MAX_MASTER: u32 = 15;
    const MAX_EXT_FSYNC: u32 = 3;
}

fn clamp_threshold(value: i32) -> u32 {
    value.clamp(0, 255) as u32
}

impl Channel<'_> {
    /// Snapshot of the cached configuration.
    pub fn config(&self) -> VdmaConfig {
        self.state.lock(|inner| inner.config)
    }

    /// Apply `cfg`. Geometry takes effect on the next transfer start.
    pub fn set_config(&self, cfg: &VdmaConfig) -> Result<(), VdmaError> {
        if cfg.reset {
            return self.reset();
        }

        self.state.lock(|inner| {
            if cfg.vsize == VdmaConfig::PARK_TOGGLE {
                if cfg.park {
                    self.regs.modify_dmacr(Dmacr::CircEn::CLEAR);
                } else {
                    self.regs.modify_dmacr(Dmacr::CircEn::SET);
                }
                inner.config.park = cfg.park;
                inner.config.park_frm = cfg.park_frm;
                if cfg.park && (cfg.park_frm as usize) < self.num_frms() {
                    self.write_park_ptr(cfg.park_frm);
                }
                debug!(
                    "vdma: chan {} park {} frame {}",
                    self.id(),
                    cfg.park,
                    cfg.park_frm
                );
                return Ok(());
            }

            if cfg.hsize == VdmaConfig::THRESHOLD_ONLY {
                let coalesce = clamp_threshold(cfg.coalesce);
                let delay = clamp_threshold(cfg.delay);
                self.regs
                    .modify_dmacr(Dmacr::FrameCount.val(coalesce) + Dmacr::Delay.val(delay));
                inner.config.coalesce = coalesce as i32;
                inner.config.delay = delay as i32;
                return Ok(());
            }

            if cfg.vsize < 0
                || cfg.hsize < 0
                || !(0..=VdmaConfig::MAX_STRIDE).contains(&cfg.stride)
                || cfg.frm_dly > VdmaConfig::MAX_FRM_DLY
                || cfg.master > VdmaConfig::MAX_MASTER
                || cfg.ext_fsync > VdmaConfig::MAX_EXT_FSYNC
                || (cfg.park && cfg.park_frm as usize >= self.num_frms())
            {
                error!("vdma: chan {} rejected config {:?}", self.id(), cfg);
                return Err(VdmaError::InvalidArgument);
            }

            let coalesce = clamp_threshold(cfg.coalesce);
            let delay = clamp_threshold(cfg.delay);
            inner.config = VdmaConfig {
                reset: false,
                coalesce: coalesce as i32,
                delay: delay as i32,
                ..*cfg
            };

            let mut dmacr = self.regs.dmacr();
            if cfg.gen_lock && self.is_genlock_capable() {
                dmacr.modify(Dmacr::GenlockEn::SET + Dmacr::Master.val(cfg.master));
            } else {
                dmacr.modify(Dmacr::GenlockEn::CLEAR + Dmacr::Master.val(0));
            }
            dmacr.modify(
                Dmacr::FrameCount.val(coalesce)
                    + Dmacr::Delay.val(delay)
                    + Dmacr::FsyncSrc.val(cfg.ext_fsync),
            );
            self.regs.set_dmacr(dmacr);
            Ok(())
        })
    }
}
