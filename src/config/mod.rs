//! Capture channel configuration.
//!
//! A [`CamifConfig`] is built once per channel instance from the interface
//! kind and the hardware generation. Generation specific behaviour lives
//! behind [`HwVariant`] and is resolved here, at configuration time.

use crate::registers::consts::{CSIS_V2_LAYOUT, CSIS_V4_LAYOUT, FLITE_LAYOUT, RegLayout};

/// Number of MIPI virtual channels a CSI link can carry.
pub const CSI_VIRTUAL_CH_MAX: usize = 4;

const STOP_TIMEOUT_MS: u32 = 3000;
const FLITE_OVERFLOW_COUNT: u32 = 10;
const LOG_INTERVAL_OF_DROPS: u32 = 30;
const CSI_ERR_COUNT: u32 = 10;

/// Kind of capture front-end backing the channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum InterfaceKind {
    /// MIPI-CSI receiver with its own DMA.
    Csi,
    /// Legacy FLITE capture block.
    Flite,
}

/// Hardware generations seen across Exynos FIMC-IS parts.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HwVersion {
    V3_20_0,
    V4_3_0,
    V5_2_0,
    V5_10_0,
    V7_0_0,
}

impl HwVersion {
    pub fn variant(self) -> &'static dyn HwVariant {
        match self {
            HwVersion::V3_20_0 => &V3_20_0,
            HwVersion::V4_3_0 => &V4_3_0,
            HwVersion::V5_2_0 => &V5_2_0,
            HwVersion::V5_10_0 => &V5_10_0,
            HwVersion::V7_0_0 => &V7_0_0,
        }
    }
}

/// Where the channel output goes after capture.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Downstream {
    /// Standalone capture, no ischain attached.
    #[default]
    None,
    /// Joined to an ischain that reads the capture from memory (M2M).
    Memory,
    /// Joined to an ischain fed on-the-fly by the 3AA.
    Otf,
}

/// Per-generation hardware behaviour.
pub trait HwVariant: Sync {
    fn version(&self) -> HwVersion;

    /// Register offsets used by the buffer controller.
    fn layout(&self) -> &'static RegLayout;

    /// How many frames sit in PROCESS before the oldest one may complete
    /// while DMA output stays enabled.
    fn process_depth(&self) -> usize {
        2
    }

    /// Ring depth for VC1..VC3 multi-buffering, 0 when unsupported.
    fn multibuf_depth(&self) -> usize {
        0
    }

    /// Whether a frame start skipped as lost still advances fcount.
    fn counts_lost_frames(&self) -> bool {
        false
    }
}

#[allow(non_camel_case_types)]
pub struct V3_20_0;
#[allow(non_camel_case_types)]
pub struct V4_3_0;
#[allow(non_camel_case_types)]
pub struct V5_2_0;
#[allow(non_camel_case_types)]
pub struct V5_10_0;
#[allow(non_camel_case_types)]
pub struct V7_0_0;

impl HwVariant for V3_20_0 {
    fn version(&self) -> HwVersion {
        HwVersion::V3_20_0
    }

    fn layout(&self) -> &'static RegLayout {
        &FLITE_LAYOUT
    }
}

impl HwVariant for V4_3_0 {
    fn version(&self) -> HwVersion {
        HwVersion::V4_3_0
    }

    fn layout(&self) -> &'static RegLayout {
        &FLITE_LAYOUT
    }
}

impl HwVariant for V5_2_0 {
    fn version(&self) -> HwVersion {
        HwVersion::V5_2_0
    }

    fn layout(&self) -> &'static RegLayout {
        &CSIS_V2_LAYOUT
    }

    fn multibuf_depth(&self) -> usize {
        2
    }
}

impl HwVariant for V5_10_0 {
    fn version(&self) -> HwVersion {
        HwVersion::V5_10_0
    }

    fn layout(&self) -> &'static RegLayout {
        &CSIS_V2_LAYOUT
    }

    fn multibuf_depth(&self) -> usize {
        3
    }
}

impl HwVariant for V7_0_0 {
    fn version(&self) -> HwVersion {
        HwVersion::V7_0_0
    }

    fn layout(&self) -> &'static RegLayout {
        &CSIS_V4_LAYOUT
    }

    fn multibuf_depth(&self) -> usize {
        4
    }

    fn counts_lost_frames(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct CamifConfig {
    pub instance: u32,
    pub kind: InterfaceKind,
    pub version: HwVersion,
    pub irq: u32,
    /// The channel owns a DMA engine and an interrupt line.
    pub dma_enable: bool,
    /// Software-only channel, never touches registers.
    pub dummy: bool,
    pub stop_timeout_ms: u32,
    pub overflow_log_interval: u32,
    pub drop_log_interval: u32,
    pub error_count_threshold: u32,
    /// Overrides [`HwVariant::process_depth`] when set.
    pub process_depth: Option<usize>,
    pub downstream: Downstream,
    /// Index of the fcount mailbox slot this channel publishes into.
    pub sensor_position: usize,
}

impl CamifConfig {
    pub fn new(kind: InterfaceKind, version: HwVersion) -> Self {
        match kind {
            InterfaceKind::Csi => Self::new_csi(version),
            InterfaceKind::Flite => Self::new_flite(version),
        }
    }

    fn new_csi(version: HwVersion) -> Self {
        Self {
            kind: InterfaceKind::Csi,
            ..Self::base(version)
        }
    }

    fn new_flite(version: HwVersion) -> Self {
        Self {
            kind: InterfaceKind::Flite,
            ..Self::base(version)
        }
    }

    fn base(version: HwVersion) -> Self {
        Self {
            instance: 0,
            kind: InterfaceKind::Csi,
            version,
            irq: 0,
            dma_enable: true,
            dummy: false,
            stop_timeout_ms: STOP_TIMEOUT_MS,
            overflow_log_interval: FLITE_OVERFLOW_COUNT,
            drop_log_interval: LOG_INTERVAL_OF_DROPS,
            error_count_threshold: CSI_ERR_COUNT,
            process_depth: None,
            downstream: Downstream::None,
            sensor_position: 0,
        }
    }

    pub fn with_instance(mut self, instance: u32) -> Self {
        self.instance = instance;
        self
    }

    pub fn with_irq(mut self, irq: u32) -> Self {
        self.irq = irq;
        self
    }

    pub fn with_dma(mut self, enable: bool) -> Self {
        self.dma_enable = enable;
        self
    }

    pub fn with_dummy(mut self, dummy: bool) -> Self {
        self.dummy = dummy;
        self
    }

    pub fn with_stop_timeout_ms(mut self, ms: u32) -> Self {
        self.stop_timeout_ms = ms;
        self
    }

    pub fn with_process_depth(mut self, depth: usize) -> Self {
        self.process_depth = Some(depth);
        self
    }

    pub fn with_downstream(mut self, downstream: Downstream) -> Self {
        self.downstream = downstream;
        self
    }

    pub fn with_sensor_position(mut self, position: usize) -> Self {
        self.sensor_position = position;
        self
    }

    pub fn variant(&self) -> &'static dyn HwVariant {
        self.version.variant()
    }

    /// Effective dual-buffer threshold, never below 1.
    pub fn process_depth(&self) -> usize {
        self.process_depth
            .unwrap_or_else(|| self.variant().process_depth())
            .max(1)
    }

    /// Ring depth for VC1..VC3; FLITE never multi-buffers.
    pub fn multibuf_depth(&self) -> usize {
        match self.kind {
            InterfaceKind::Csi => self.variant().multibuf_depth().min(CSI_VIRTUAL_CH_MAX),
            InterfaceKind::Flite => 0,
        }
    }
}
