// Licensed under the Apache-2.0 license

use log::{debug, error};
use registers_vdma::bits::{Dmasr, ALL_ERR_MASK, ALL_IRQ_MASK, ERR_RECOVER_MASK};
use registers_vdma::regs::CtrlReg;

use crate::chan::Channel;
use crate::error::VdmaError;
use crate::hil::IrqReturn;

impl Channel<'_> {
    /// Hard interrupt half.
    ///
    /// Acknowledges the status bits, classifies errors, retires the active
    /// transfer on frame completion and starts the next one. Callbacks are
    /// left to [`Channel::process_completed`].
    pub fn handle_interrupt(&self) -> IrqReturn {
        let ret = self.state.lock(|inner| {
            let enabled = self.regs.read(CtrlReg::Dmacr) & ALL_IRQ_MASK;
            self.mask_irqs();

            let status = self.regs.dmasr();
            let irqs = status.get() & ALL_IRQ_MASK;
            if irqs == 0 {
                self.regs.set_bits(CtrlReg::Dmacr, enabled);
                return IrqReturn::NotMine;
            }

            // Write 1 to clear
            self.regs.ack_dmasr(irqs);

            if status.is_set(Dmasr::ErrIrq) {
                let errors = status.get() & ALL_ERR_MASK;
                self.regs.ack_dmasr(errors & ERR_RECOVER_MASK);

                if !self.flush_on_fsync() || errors & !ERR_RECOVER_MASK != 0 {
                    error!(
                        "vdma: chan {} error, sr {:08x} cdr {:08x} tdr {:08x}",
                        self.id(),
                        errors,
                        self.regs.read(CtrlReg::Curdesc),
                        self.regs.read(CtrlReg::Taildesc)
                    );
                    self.fail(inner, VdmaError::HardwareError(errors));
                }
            }

            if status.is_set(Dmasr::DlyCntIrq) {
                // Inter-packet delay expired; nothing to retire.
                debug!("vdma: chan {} inter-packet latency too long", self.id());
            }

            if status.is_set(Dmasr::FrmCntIrq) {
                Self::complete_active(inner);
                self.start_transfer(inner);
            }

            // A faulted channel stays masked until it is reset.
            if !inner.lifecycle.is_errored() {
                self.regs.set_bits(CtrlReg::Dmacr, ALL_IRQ_MASK);
            }
            IrqReturn::Handled
        });

        if ret == IrqReturn::Handled {
            self.platform().schedule_deferred(self.id());
        }
        ret
    }

    /// Deferred half: run the callbacks of finished transfers in completion
    /// order and recycle their descriptors.
    ///
    /// No lock is held while a callback runs, so callbacks may submit.
    pub fn process_completed(&self) {
        while let Some(tx) = self.state.lock(|inner| inner.done.pop_front()) {
            if let Some((client, param)) = tx.callback() {
                client.transfer_done(tx.cookie(), param);
                client.dependencies_ready(tx.cookie());
            }
            self.free_tx_descriptor(tx);
        }
    }
}
