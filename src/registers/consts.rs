//! Raw offsets and constants for the capture DMA blocks.
//!
//! Offsets are relative to the channel register base. The interrupt block
//! lives at the bottom of every layout; see [`super::int`].

use crate::config::CSI_VIRTUAL_CH_MAX;

/// Register offsets the buffer controller needs for one hardware generation.
#[derive(Debug)]
pub struct RegLayout {
    /// Start of the DMA address slot bank per VC; slot `n` is at `+ 4 * n`.
    pub dma_addr: [usize; CSI_VIRTUAL_CH_MAX],
    /// DMA output enable per VC.
    pub dma_ctrl: [usize; CSI_VIRTUAL_CH_MAX],
    /// Hardware ring head per VC.
    pub frameptr: [usize; CSI_VIRTUAL_CH_MAX],
    /// On-the-fly output enable towards the 3AA.
    pub otf_ctrl: usize,
    /// Output path selection.
    pub path_ctrl: usize,
    /// Writing 1 requests an abort of in-flight DMA.
    pub dma_abort: usize,
}

pub const FLITE_LAYOUT: RegLayout = RegLayout {
    dma_addr: [0x0100, 0, 0, 0],
    dma_ctrl: [0x0120, 0, 0, 0],
    frameptr: [0x0124, 0, 0, 0],
    otf_ctrl: 0x0130,
    path_ctrl: 0x0134,
    dma_abort: 0x0138,
};

pub const CSIS_V2_LAYOUT: RegLayout = RegLayout {
    dma_addr: [0x0200, 0x0220, 0x0240, 0x0260],
    dma_ctrl: [0x0300, 0x0304, 0x0308, 0x030C],
    frameptr: [0x0310, 0x0314, 0x0318, 0x031C],
    otf_ctrl: 0x0320,
    path_ctrl: 0x0324,
    dma_abort: 0x0328,
};

pub const CSIS_V4_LAYOUT: RegLayout = RegLayout {
    dma_addr: [0x1000, 0x1100, 0x1200, 0x1300],
    dma_ctrl: [0x1040, 0x1140, 0x1240, 0x1340],
    frameptr: [0x1044, 0x1144, 0x1244, 0x1344],
    otf_ctrl: 0x0400,
    path_ctrl: 0x0404,
    dma_abort: 0x0408,
};

/// Path register values.
pub const PATH_NONE: u32 = 0;
pub const PATH_M2M: u32 = 1;
pub const PATH_OTF: u32 = 2;

/// Every interrupt source.
pub const IRQ_MASK_ALL: u32 = 0x0FFF;
/// FIFO overflow sources (luma, chroma-B, chroma-R).
pub const IRQ_MASK_OVERFLOW: u32 = 0x0070;

/// CSI per-VC error word bits with the names used in logs.
pub const CSIS_ERRORS: [(u32, &str); 16] = [
    (CSIS_ERR_ID, "ID"),
    (CSIS_ERR_CRC, "CRC"),
    (CSIS_ERR_ECC, "ECC"),
    (CSIS_ERR_WRONG_CFG, "WRONG_CFG"),
    (CSIS_ERR_OVERFLOW_VC, "OVERFLOW_VC"),
    (CSIS_ERR_LOST_FE_VC, "LOST_FE_VC"),
    (CSIS_ERR_LOST_FS_VC, "LOST_FS_VC"),
    (CSIS_ERR_SOT_VC, "SOT_VC"),
    (CSIS_ERR_DMA_OTF_OVERLAP, "DMA_OTF_OVERLAP"),
    (CSIS_ERR_DMA_DMAFIFO_FULL, "DMA_DMAFIFO_FULL"),
    (CSIS_ERR_DMA_TRXFIFO_FULL, "DMA_TRXFIFO_FULL"),
    (CSIS_ERR_DMA_BRESP, "DMA_BRESP"),
    (CSIS_ERR_DMA_ABORT_DONE, "DMA_ABORT_DONE"),
    (CSIS_ERR_VRESOL_MISMATCH, "VRESOL_MISMATCH"),
    (CSIS_ERR_HRESOL_MISMATCH, "HRESOL_MISMATCH"),
    (CSIS_ERR_DMA_FRAME_DROP, "DMA_FRAME_DROP"),
];

pub const CSIS_ERR_ID: u32 = 1 << 0;
pub const CSIS_ERR_CRC: u32 = 1 << 1;
pub const CSIS_ERR_ECC: u32 = 1 << 2;
pub const CSIS_ERR_WRONG_CFG: u32 = 1 << 3;
pub const CSIS_ERR_OVERFLOW_VC: u32 = 1 << 4;
pub const CSIS_ERR_LOST_FE_VC: u32 = 1 << 5;
pub const CSIS_ERR_LOST_FS_VC: u32 = 1 << 6;
pub const CSIS_ERR_SOT_VC: u32 = 1 << 7;
pub const CSIS_ERR_DMA_OTF_OVERLAP: u32 = 1 << 8;
pub const CSIS_ERR_DMA_DMAFIFO_FULL: u32 = 1 << 9;
pub const CSIS_ERR_DMA_TRXFIFO_FULL: u32 = 1 << 10;
pub const CSIS_ERR_DMA_BRESP: u32 = 1 << 11;
pub const CSIS_ERR_DMA_ABORT_DONE: u32 = 1 << 12;
pub const CSIS_ERR_VRESOL_MISMATCH: u32 = 1 << 13;
pub const CSIS_ERR_HRESOL_MISMATCH: u32 = 1 << 14;
pub const CSIS_ERR_DMA_FRAME_DROP: u32 = 1 << 15;
