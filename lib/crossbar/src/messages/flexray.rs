//! FlexRay messages. The cluster and node parameter blocks are carried as
//! plain data; range validation is the controller's responsibility, not the
//! fabric's.

use crate::error::{Error, Result};
use crate::messages::SimTime;
use crate::wire::buffer::MessageBuffer;
use crate::wire::{Decode, Encode};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum FlexrayChannel {
    None = 0,
    A = 1,
    B = 2,
    AB = 3,
}

impl FlexrayChannel {
    pub fn from_u8(value: u8) -> Result<FlexrayChannel> {
        match value {
            0 => Ok(FlexrayChannel::None),
            1 => Ok(FlexrayChannel::A),
            2 => Ok(FlexrayChannel::B),
            3 => Ok(FlexrayChannel::AB),
            other => Err(Error::Protocol(format!("invalid FlexRay channel {}", other))),
        }
    }
}

/// Frame header. `flags` carries the indicator bits (payload preamble, null
/// frame, sync frame, startup frame).
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FlexrayHeader {
    pub flags: u8,
    pub frame_id: u16,
    pub payload_length: u8,
    pub header_crc: u16,
    pub cycle_count: u8,
}

impl Encode for FlexrayHeader {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_u8(self.flags);
        buffer.write_u16(self.frame_id);
        buffer.write_u8(self.payload_length);
        buffer.write_u16(self.header_crc);
        buffer.write_u8(self.cycle_count);
    }
}

impl Decode for FlexrayHeader {
    fn decode(buffer: &mut MessageBuffer) -> Result<FlexrayHeader> {
        Ok(FlexrayHeader {
            flags: buffer.read_u8()?,
            frame_id: buffer.read_u16()?,
            payload_length: buffer.read_u8()?,
            header_crc: buffer.read_u16()?,
            cycle_count: buffer.read_u8()?,
        })
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FlexrayFrame {
    pub header: FlexrayHeader,
    pub payload: Vec<u8>,
}

impl Encode for FlexrayFrame {
    fn encode(&self, buffer: &mut MessageBuffer) {
        self.header.encode(buffer);
        buffer.write_bytes(&self.payload);
    }
}

impl Decode for FlexrayFrame {
    fn decode(buffer: &mut MessageBuffer) -> Result<FlexrayFrame> {
        Ok(FlexrayFrame {
            header: FlexrayHeader::decode(buffer)?,
            payload: buffer.read_bytes()?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FlexrayFrameEvent {
    pub timestamp: SimTime,
    pub channel: FlexrayChannel,
    pub frame: FlexrayFrame,
}

impl Encode for FlexrayFrameEvent {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_i64(self.timestamp);
        buffer.write_u8(self.channel as u8);
        self.frame.encode(buffer);
    }
}

impl Decode for FlexrayFrameEvent {
    fn decode(buffer: &mut MessageBuffer) -> Result<FlexrayFrameEvent> {
        Ok(FlexrayFrameEvent {
            timestamp: buffer.read_i64()?,
            channel: FlexrayChannel::from_u8(buffer.read_u8()?)?,
            frame: FlexrayFrame::decode(buffer)?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FlexrayFrameTransmitEvent {
    pub timestamp: SimTime,
    pub tx_buffer_index: u16,
    pub channel: FlexrayChannel,
    pub frame: FlexrayFrame,
}

impl Encode for FlexrayFrameTransmitEvent {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_i64(self.timestamp);
        buffer.write_u16(self.tx_buffer_index);
        buffer.write_u8(self.channel as u8);
        self.frame.encode(buffer);
    }
}

impl Decode for FlexrayFrameTransmitEvent {
    fn decode(buffer: &mut MessageBuffer) -> Result<FlexrayFrameTransmitEvent> {
        Ok(FlexrayFrameTransmitEvent {
            timestamp: buffer.read_i64()?,
            tx_buffer_index: buffer.read_u16()?,
            channel: FlexrayChannel::from_u8(buffer.read_u8()?)?,
            frame: FlexrayFrame::decode(buffer)?,
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum FlexraySymbolPattern {
    CasMts = 0,
    Wus = 1,
    Wudop = 2,
}

impl FlexraySymbolPattern {
    pub fn from_u8(value: u8) -> Result<FlexraySymbolPattern> {
        match value {
            0 => Ok(FlexraySymbolPattern::CasMts),
            1 => Ok(FlexraySymbolPattern::Wus),
            2 => Ok(FlexraySymbolPattern::Wudop),
            other => Err(Error::Protocol(format!("invalid FlexRay symbol pattern {}", other))),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FlexraySymbolEvent {
    pub timestamp: SimTime,
    pub channel: FlexrayChannel,
    pub pattern: FlexraySymbolPattern,
}

impl Encode for FlexraySymbolEvent {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_i64(self.timestamp);
        buffer.write_u8(self.channel as u8);
        buffer.write_u8(self.pattern as u8);
    }
}

impl Decode for FlexraySymbolEvent {
    fn decode(buffer: &mut MessageBuffer) -> Result<FlexraySymbolEvent> {
        Ok(FlexraySymbolEvent {
            timestamp: buffer.read_i64()?,
            channel: FlexrayChannel::from_u8(buffer.read_u8()?)?,
            pattern: FlexraySymbolPattern::from_u8(buffer.read_u8()?)?,
        })
    }
}

/// Same wire shape as [`FlexraySymbolEvent`], sent back to the initiating
/// controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FlexraySymbolTransmitEvent {
    pub timestamp: SimTime,
    pub channel: FlexrayChannel,
    pub pattern: FlexraySymbolPattern,
}

impl Encode for FlexraySymbolTransmitEvent {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_i64(self.timestamp);
        buffer.write_u8(self.channel as u8);
        buffer.write_u8(self.pattern as u8);
    }
}

impl Decode for FlexraySymbolTransmitEvent {
    fn decode(buffer: &mut MessageBuffer) -> Result<FlexraySymbolTransmitEvent> {
        Ok(FlexraySymbolTransmitEvent {
            timestamp: buffer.read_i64()?,
            channel: FlexrayChannel::from_u8(buffer.read_u8()?)?,
            pattern: FlexraySymbolPattern::from_u8(buffer.read_u8()?)?,
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FlexrayCycleStartEvent {
    pub timestamp: SimTime,
    pub cycle_counter: u8,
}

impl Encode for FlexrayCycleStartEvent {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_i64(self.timestamp);
        buffer.write_u8(self.cycle_counter);
    }
}

impl Decode for FlexrayCycleStartEvent {
    fn decode(buffer: &mut MessageBuffer) -> Result<FlexrayCycleStartEvent> {
        Ok(FlexrayCycleStartEvent {
            timestamp: buffer.read_i64()?,
            cycle_counter: buffer.read_u8()?,
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum FlexrayChiCommand {
    Run = 0,
    DeferredHalt = 1,
    Freeze = 2,
    AllowColdstart = 3,
    AllSlots = 4,
    Wakeup = 5,
}

impl FlexrayChiCommand {
    pub fn from_u8(value: u8) -> Result<FlexrayChiCommand> {
        match value {
            0 => Ok(FlexrayChiCommand::Run),
            1 => Ok(FlexrayChiCommand::DeferredHalt),
            2 => Ok(FlexrayChiCommand::Freeze),
            3 => Ok(FlexrayChiCommand::AllowColdstart),
            4 => Ok(FlexrayChiCommand::AllSlots),
            5 => Ok(FlexrayChiCommand::Wakeup),
            other => Err(Error::Protocol(format!("invalid FlexRay CHI command {}", other))),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FlexrayHostCommand {
    pub command: FlexrayChiCommand,
}

impl Encode for FlexrayHostCommand {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_u8(self.command as u8);
    }
}

impl Decode for FlexrayHostCommand {
    fn decode(buffer: &mut MessageBuffer) -> Result<FlexrayHostCommand> {
        Ok(FlexrayHostCommand {
            command: FlexrayChiCommand::from_u8(buffer.read_u8()?)?,
        })
    }
}

/// Global cluster timing parameters, identical on every node of a cluster.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FlexrayClusterParameters {
    pub g_coldstart_attempts: u8,
    pub g_cycle_count_max: u8,
    pub gd_action_point_offset: u16,
    pub gd_dynamic_slot_idle_phase: u16,
    pub gd_mini_slot: u16,
    pub gd_mini_slot_action_point_offset: u16,
    pub gd_static_slot: u16,
    pub gd_symbol_window: u16,
    pub gd_symbol_window_action_point_offset: u16,
    pub gd_tss_transmitter: u16,
    pub gd_wakeup_tx_active: u16,
    pub gd_wakeup_tx_idle: u16,
    pub g_listen_noise: u8,
    pub g_macro_per_cycle: u16,
    pub g_max_without_clock_correction_fatal: u8,
    pub g_max_without_clock_correction_passive: u8,
    pub g_number_of_mini_slots: u16,
    pub g_number_of_static_slots: u16,
    pub g_payload_length_static: u16,
    pub g_sync_frame_id_count_max: u8,
}

impl Encode for FlexrayClusterParameters {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_u8(self.g_coldstart_attempts);
        buffer.write_u8(self.g_cycle_count_max);
        buffer.write_u16(self.gd_action_point_offset);
        buffer.write_u16(self.gd_dynamic_slot_idle_phase);
        buffer.write_u16(self.gd_mini_slot);
        buffer.write_u16(self.gd_mini_slot_action_point_offset);
        buffer.write_u16(self.gd_static_slot);
        buffer.write_u16(self.gd_symbol_window);
        buffer.write_u16(self.gd_symbol_window_action_point_offset);
        buffer.write_u16(self.gd_tss_transmitter);
        buffer.write_u16(self.gd_wakeup_tx_active);
        buffer.write_u16(self.gd_wakeup_tx_idle);
        buffer.write_u8(self.g_listen_noise);
        buffer.write_u16(self.g_macro_per_cycle);
        buffer.write_u8(self.g_max_without_clock_correction_fatal);
        buffer.write_u8(self.g_max_without_clock_correction_passive);
        buffer.write_u16(self.g_number_of_mini_slots);
        buffer.write_u16(self.g_number_of_static_slots);
        buffer.write_u16(self.g_payload_length_static);
        buffer.write_u8(self.g_sync_frame_id_count_max);
    }
}

impl Decode for FlexrayClusterParameters {
    fn decode(buffer: &mut MessageBuffer) -> Result<FlexrayClusterParameters> {
        Ok(FlexrayClusterParameters {
            g_coldstart_attempts: buffer.read_u8()?,
            g_cycle_count_max: buffer.read_u8()?,
            gd_action_point_offset: buffer.read_u16()?,
            gd_dynamic_slot_idle_phase: buffer.read_u16()?,
            gd_mini_slot: buffer.read_u16()?,
            gd_mini_slot_action_point_offset: buffer.read_u16()?,
            gd_static_slot: buffer.read_u16()?,
            gd_symbol_window: buffer.read_u16()?,
            gd_symbol_window_action_point_offset: buffer.read_u16()?,
            gd_tss_transmitter: buffer.read_u16()?,
            gd_wakeup_tx_active: buffer.read_u16()?,
            gd_wakeup_tx_idle: buffer.read_u16()?,
            g_listen_noise: buffer.read_u8()?,
            g_macro_per_cycle: buffer.read_u16()?,
            g_max_without_clock_correction_fatal: buffer.read_u8()?,
            g_max_without_clock_correction_passive: buffer.read_u8()?,
            g_number_of_mini_slots: buffer.read_u16()?,
            g_number_of_static_slots: buffer.read_u16()?,
            g_payload_length_static: buffer.read_u16()?,
            g_sync_frame_id_count_max: buffer.read_u8()?,
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum FlexrayClockPeriod {
    T12_5Ns = 1,
    T25Ns = 2,
    T50Ns = 3,
}

impl FlexrayClockPeriod {
    pub fn from_u8(value: u8) -> Result<FlexrayClockPeriod> {
        match value {
            1 => Ok(FlexrayClockPeriod::T12_5Ns),
            2 => Ok(FlexrayClockPeriod::T25Ns),
            3 => Ok(FlexrayClockPeriod::T50Ns),
            other => Err(Error::Protocol(format!("invalid FlexRay clock period {}", other))),
        }
    }
}

/// Per-node timing parameters.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FlexrayNodeParameters {
    pub p_allow_halt_due_to_clock: u8,
    pub p_allow_passive_to_active: u8,
    pub p_channels: FlexrayChannel,
    pub p_cluster_drift_damping: u8,
    pub pd_accepted_startup_range: u32,
    pub pd_listen_timeout: u32,
    pub p_key_slot_id: u16,
    pub p_key_slot_only_enabled: u8,
    pub p_key_slot_used_for_startup: u8,
    pub p_key_slot_used_for_sync: u8,
    pub p_latest_tx: u16,
    pub p_macro_initial_offset_a: u8,
    pub p_macro_initial_offset_b: u8,
    pub p_micro_initial_offset_a: u32,
    pub p_micro_initial_offset_b: u32,
    pub p_micro_per_cycle: u32,
    pub p_offset_correction_out: u32,
    pub p_offset_correction_start: u16,
    pub p_rate_correction_out: u32,
    pub p_wakeup_channel: FlexrayChannel,
    pub p_wakeup_pattern: u8,
    pub pd_microtick: FlexrayClockPeriod,
    pub p_samples_per_microtick: u8,
}

impl Default for FlexrayNodeParameters {
    fn default() -> FlexrayNodeParameters {
        FlexrayNodeParameters {
            p_allow_halt_due_to_clock: 0,
            p_allow_passive_to_active: 0,
            p_channels: FlexrayChannel::AB,
            p_cluster_drift_damping: 0,
            pd_accepted_startup_range: 0,
            pd_listen_timeout: 0,
            p_key_slot_id: 0,
            p_key_slot_only_enabled: 0,
            p_key_slot_used_for_startup: 0,
            p_key_slot_used_for_sync: 0,
            p_latest_tx: 0,
            p_macro_initial_offset_a: 0,
            p_macro_initial_offset_b: 0,
            p_micro_initial_offset_a: 0,
            p_micro_initial_offset_b: 0,
            p_micro_per_cycle: 0,
            p_offset_correction_out: 0,
            p_offset_correction_start: 0,
            p_rate_correction_out: 0,
            p_wakeup_channel: FlexrayChannel::A,
            p_wakeup_pattern: 0,
            pd_microtick: FlexrayClockPeriod::T25Ns,
            p_samples_per_microtick: 1,
        }
    }
}

impl Encode for FlexrayNodeParameters {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_u8(self.p_allow_halt_due_to_clock);
        buffer.write_u8(self.p_allow_passive_to_active);
        buffer.write_u8(self.p_channels as u8);
        buffer.write_u8(self.p_cluster_drift_damping);
        buffer.write_u32(self.pd_accepted_startup_range);
        buffer.write_u32(self.pd_listen_timeout);
        buffer.write_u16(self.p_key_slot_id);
        buffer.write_u8(self.p_key_slot_only_enabled);
        buffer.write_u8(self.p_key_slot_used_for_startup);
        buffer.write_u8(self.p_key_slot_used_for_sync);
        buffer.write_u16(self.p_latest_tx);
        buffer.write_u8(self.p_macro_initial_offset_a);
        buffer.write_u8(self.p_macro_initial_offset_b);
        buffer.write_u32(self.p_micro_initial_offset_a);
        buffer.write_u32(self.p_micro_initial_offset_b);
        buffer.write_u32(self.p_micro_per_cycle);
        buffer.write_u32(self.p_offset_correction_out);
        buffer.write_u16(self.p_offset_correction_start);
        buffer.write_u32(self.p_rate_correction_out);
        buffer.write_u8(self.p_wakeup_channel as u8);
        buffer.write_u8(self.p_wakeup_pattern);
        buffer.write_u8(self.pd_microtick as u8);
        buffer.write_u8(self.p_samples_per_microtick);
    }
}

impl Decode for FlexrayNodeParameters {
    fn decode(buffer: &mut MessageBuffer) -> Result<FlexrayNodeParameters> {
        Ok(FlexrayNodeParameters {
            p_allow_halt_due_to_clock: buffer.read_u8()?,
            p_allow_passive_to_active: buffer.read_u8()?,
            p_channels: FlexrayChannel::from_u8(buffer.read_u8()?)?,
            p_cluster_drift_damping: buffer.read_u8()?,
            pd_accepted_startup_range: buffer.read_u32()?,
            pd_listen_timeout: buffer.read_u32()?,
            p_key_slot_id: buffer.read_u16()?,
            p_key_slot_only_enabled: buffer.read_u8()?,
            p_key_slot_used_for_startup: buffer.read_u8()?,
            p_key_slot_used_for_sync: buffer.read_u8()?,
            p_latest_tx: buffer.read_u16()?,
            p_macro_initial_offset_a: buffer.read_u8()?,
            p_macro_initial_offset_b: buffer.read_u8()?,
            p_micro_initial_offset_a: buffer.read_u32()?,
            p_micro_initial_offset_b: buffer.read_u32()?,
            p_micro_per_cycle: buffer.read_u32()?,
            p_offset_correction_out: buffer.read_u32()?,
            p_offset_correction_start: buffer.read_u16()?,
            p_rate_correction_out: buffer.read_u32()?,
            p_wakeup_channel: FlexrayChannel::from_u8(buffer.read_u8()?)?,
            p_wakeup_pattern: buffer.read_u8()?,
            pd_microtick: FlexrayClockPeriod::from_u8(buffer.read_u8()?)?,
            p_samples_per_microtick: buffer.read_u8()?,
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum FlexrayTransmissionMode {
    SingleShot = 0,
    Continuous = 1,
}

impl FlexrayTransmissionMode {
    pub fn from_u8(value: u8) -> Result<FlexrayTransmissionMode> {
        match value {
            0 => Ok(FlexrayTransmissionMode::SingleShot),
            1 => Ok(FlexrayTransmissionMode::Continuous),
            other => Err(Error::Protocol(format!("invalid FlexRay transmission mode {}", other))),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FlexrayTxBufferConfig {
    pub channels: FlexrayChannel,
    pub slot_id: u16,
    pub offset: u8,
    pub repetition: u8,
    pub has_payload_preamble_indicator: bool,
    pub header_crc: u16,
    pub transmission_mode: FlexrayTransmissionMode,
}

impl Encode for FlexrayTxBufferConfig {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_u8(self.channels as u8);
        buffer.write_u16(self.slot_id);
        buffer.write_u8(self.offset);
        buffer.write_u8(self.repetition);
        buffer.write_bool(self.has_payload_preamble_indicator);
        buffer.write_u16(self.header_crc);
        buffer.write_u8(self.transmission_mode as u8);
    }
}

impl Decode for FlexrayTxBufferConfig {
    fn decode(buffer: &mut MessageBuffer) -> Result<FlexrayTxBufferConfig> {
        Ok(FlexrayTxBufferConfig {
            channels: FlexrayChannel::from_u8(buffer.read_u8()?)?,
            slot_id: buffer.read_u16()?,
            offset: buffer.read_u8()?,
            repetition: buffer.read_u8()?,
            has_payload_preamble_indicator: buffer.read_bool()?,
            header_crc: buffer.read_u16()?,
            transmission_mode: FlexrayTransmissionMode::from_u8(buffer.read_u8()?)?,
        })
    }
}

/// Full controller configuration announced when a FlexRay controller is
/// configured.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FlexrayControllerConfig {
    pub cluster_params: FlexrayClusterParameters,
    pub node_params: FlexrayNodeParameters,
    pub buffer_configs: Vec<FlexrayTxBufferConfig>,
}

impl Encode for FlexrayControllerConfig {
    fn encode(&self, buffer: &mut MessageBuffer) {
        self.cluster_params.encode(buffer);
        self.node_params.encode(buffer);
        buffer.write_seq(&self.buffer_configs);
    }
}

impl Decode for FlexrayControllerConfig {
    fn decode(buffer: &mut MessageBuffer) -> Result<FlexrayControllerConfig> {
        Ok(FlexrayControllerConfig {
            cluster_params: FlexrayClusterParameters::decode(buffer)?,
            node_params: FlexrayNodeParameters::decode(buffer)?,
            buffer_configs: buffer.read_seq()?,
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FlexrayTxBufferConfigUpdate {
    pub tx_buffer_index: u16,
    pub tx_buffer_config: FlexrayTxBufferConfig,
}

impl Encode for FlexrayTxBufferConfigUpdate {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_u16(self.tx_buffer_index);
        self.tx_buffer_config.encode(buffer);
    }
}

impl Decode for FlexrayTxBufferConfigUpdate {
    fn decode(buffer: &mut MessageBuffer) -> Result<FlexrayTxBufferConfigUpdate> {
        Ok(FlexrayTxBufferConfigUpdate {
            tx_buffer_index: buffer.read_u16()?,
            tx_buffer_config: FlexrayTxBufferConfig::decode(buffer)?,
        })
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FlexrayTxBufferUpdate {
    pub tx_buffer_index: u16,
    pub payload_data_valid: bool,
    pub payload: Vec<u8>,
}

impl Encode for FlexrayTxBufferUpdate {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_u16(self.tx_buffer_index);
        buffer.write_bool(self.payload_data_valid);
        buffer.write_bytes(&self.payload);
    }
}

impl Decode for FlexrayTxBufferUpdate {
    fn decode(buffer: &mut MessageBuffer) -> Result<FlexrayTxBufferUpdate> {
        Ok(FlexrayTxBufferUpdate {
            tx_buffer_index: buffer.read_u16()?,
            payload_data_valid: buffer.read_bool()?,
            payload: buffer.read_bytes()?,
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum FlexrayPocState {
    DefaultConfig = 0,
    Config = 1,
    Ready = 2,
    Startup = 3,
    Wakeup = 4,
    NormalActive = 5,
    NormalPassive = 6,
    Halt = 7,
}

impl FlexrayPocState {
    pub fn from_u8(value: u8) -> Result<FlexrayPocState> {
        match value {
            0 => Ok(FlexrayPocState::DefaultConfig),
            1 => Ok(FlexrayPocState::Config),
            2 => Ok(FlexrayPocState::Ready),
            3 => Ok(FlexrayPocState::Startup),
            4 => Ok(FlexrayPocState::Wakeup),
            5 => Ok(FlexrayPocState::NormalActive),
            6 => Ok(FlexrayPocState::NormalPassive),
            7 => Ok(FlexrayPocState::Halt),
            other => Err(Error::Protocol(format!("invalid FlexRay POC state {}", other))),
        }
    }
}

/// Protocol operation control status. The sub-state fields are carried as
/// raw values; only the main state is interpreted here.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FlexrayPocStatusEvent {
    pub timestamp: SimTime,
    pub state: FlexrayPocState,
    pub chi_halt_request: bool,
    pub coldstart_noise: bool,
    pub freeze: bool,
    pub chi_ready_request: bool,
    pub error_mode: u8,
    pub slot_mode: u8,
    pub startup_state: u8,
    pub wakeup_status: u8,
}

impl Encode for FlexrayPocStatusEvent {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.write_i64(self.timestamp);
        buffer.write_u8(self.state as u8);
        buffer.write_bool(self.chi_halt_request);
        buffer.write_bool(self.coldstart_noise);
        buffer.write_bool(self.freeze);
        buffer.write_bool(self.chi_ready_request);
        buffer.write_u8(self.error_mode);
        buffer.write_u8(self.slot_mode);
        buffer.write_u8(self.startup_state);
        buffer.write_u8(self.wakeup_status);
    }
}

impl Decode for FlexrayPocStatusEvent {
    fn decode(buffer: &mut MessageBuffer) -> Result<FlexrayPocStatusEvent> {
        Ok(FlexrayPocStatusEvent {
            timestamp: buffer.read_i64()?,
            state: FlexrayPocState::from_u8(buffer.read_u8()?)?,
            chi_halt_request: buffer.read_bool()?,
            coldstart_noise: buffer.read_bool()?,
            freeze: buffer.read_bool()?,
            chi_ready_request: buffer.read_bool()?,
            error_mode: buffer.read_u8()?,
            slot_mode: buffer.read_u8()?,
            startup_state: buffer.read_u8()?,
            wakeup_status: buffer.read_u8()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> FlexrayFrame {
        FlexrayFrame {
            header: FlexrayHeader {
                flags: 0b0001,
                frame_id: 17,
                payload_length: 4,
                header_crc: 0xabc,
                cycle_count: 3,
            },
            payload: vec![1, 2, 3, 4, 5, 6, 7, 8],
        }
    }

    #[test]
    fn test_frame_events_roundtrip() {
        let event = FlexrayFrameEvent {
            timestamp: 100,
            channel: FlexrayChannel::A,
            frame: frame(),
        };
        let ack = FlexrayFrameTransmitEvent {
            timestamp: 101,
            tx_buffer_index: 2,
            channel: FlexrayChannel::B,
            frame: frame(),
        };

        let mut buffer = MessageBuffer::new();
        event.encode(&mut buffer);
        ack.encode(&mut buffer);

        assert_eq!(FlexrayFrameEvent::decode(&mut buffer).unwrap(), event);
        assert_eq!(FlexrayFrameTransmitEvent::decode(&mut buffer).unwrap(), ack);
    }

    #[test]
    fn test_controller_config_roundtrip() {
        let config = FlexrayControllerConfig {
            cluster_params: FlexrayClusterParameters {
                g_coldstart_attempts: 8,
                g_cycle_count_max: 63,
                gd_static_slot: 31,
                g_macro_per_cycle: 3636,
                g_payload_length_static: 16,
                ..Default::default()
            },
            node_params: FlexrayNodeParameters {
                p_key_slot_id: 5,
                p_micro_per_cycle: 200_000,
                ..Default::default()
            },
            buffer_configs: vec![FlexrayTxBufferConfig {
                channels: FlexrayChannel::A,
                slot_id: 5,
                offset: 0,
                repetition: 1,
                has_payload_preamble_indicator: false,
                header_crc: 0,
                transmission_mode: FlexrayTransmissionMode::Continuous,
            }],
        };

        let mut buffer = MessageBuffer::new();
        config.encode(&mut buffer);

        assert_eq!(FlexrayControllerConfig::decode(&mut buffer).unwrap(), config);
    }

    #[test]
    fn test_poc_status_roundtrip() {
        let status = FlexrayPocStatusEvent {
            timestamp: 88,
            state: FlexrayPocState::NormalActive,
            chi_halt_request: false,
            coldstart_noise: false,
            freeze: false,
            chi_ready_request: true,
            error_mode: 0,
            slot_mode: 2,
            startup_state: 1,
            wakeup_status: 0,
        };

        let mut buffer = MessageBuffer::new();
        status.encode(&mut buffer);

        assert_eq!(FlexrayPocStatusEvent::decode(&mut buffer).unwrap(), status);
    }

    #[test]
    fn test_symbol_and_cycle_roundtrip() {
        let mut buffer = MessageBuffer::new();

        let symbol = FlexraySymbolEvent {
            timestamp: 1,
            channel: FlexrayChannel::AB,
            pattern: FlexraySymbolPattern::Wus,
        };
        let cycle = FlexrayCycleStartEvent {
            timestamp: 2,
            cycle_counter: 9,
        };
        let host = FlexrayHostCommand {
            command: FlexrayChiCommand::AllowColdstart,
        };

        symbol.encode(&mut buffer);
        cycle.encode(&mut buffer);
        host.encode(&mut buffer);

        assert_eq!(FlexraySymbolEvent::decode(&mut buffer).unwrap(), symbol);
        assert_eq!(FlexrayCycleStartEvent::decode(&mut buffer).unwrap(), cycle);
        assert_eq!(FlexrayHostCommand::decode(&mut buffer).unwrap(), host);
    }
}
