pub mod channel_features;
pub mod noise_channel;
pub mod square_channel;
pub mod wave_channel;

use self::noise_channel::NoiseChannel;
use self::square_channel::SquareChannel;
use self::wave_channel::WaveChannel;

/// T-cycles between emitted samples. Not a "real" sample rate divisor; the host is
/// expected to resample the stream, same as the teacher's fixed-period sampler did.
const SAMPLE_PERIOD: u32 = 95;

bitflags::bitflags! {
    pub struct ChannelPanning: u8 {
        const CH1_RIGHT = 0b0000_0001;
        const CH2_RIGHT = 0b0000_0010;
        const CH3_RIGHT = 0b0000_0100;
        const CH4_RIGHT = 0b0000_1000;
        const CH1_LEFT  = 0b0001_0000;
        const CH2_LEFT  = 0b0010_0000;
        const CH3_LEFT  = 0b0100_0000;
        const CH4_LEFT  = 0b1000_0000;
    }
}

/// The audio processing unit. Ticked once per `Machine::tick` (one M-cycle / 4 T-cycles).
/// Unlike the teacher's lazily-`synchronise()`d version, every channel advances directly
/// on each call so there's a single forward-only call graph rooted at `Machine::tick`.
/// Mixing is integer-only throughout, dropping the teacher's `f32` sample path and
/// high-pass filter.
pub struct Apu {
    pub power: bool,
    channel1: SquareChannel,
    channel2: SquareChannel,
    channel3: WaveChannel,
    channel4: NoiseChannel,

    left_volume: u8,
    right_volume: u8,
    panning: ChannelPanning,

    frame_sequencer_step: u8,
    sample_counter: u32,
    pub sample_buffer: Vec<u8>,
}

impl Default for Apu {
    fn default() -> Self {
        Apu {
            power: true,
            channel1: SquareChannel::new(true),
            channel2: SquareChannel::new(false),
            channel3: WaveChannel::new(),
            channel4: NoiseChannel::new(),
            left_volume: 7,
            right_volume: 7,
            panning: ChannelPanning::from_bits_truncate(0xF3),
            frame_sequencer_step: 0,
            sample_counter: 0,
            sample_buffer: Vec::new(),
        }
    }
}

impl Apu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances all four channels by one M-cycle and, on a frame-sequencer clock edge
    /// (falling edge of the timer's bit 12, ~512 Hz), ticks the length/sweep/envelope
    /// counters. `fs_clock` is computed by the caller, which alone has timer state.
    pub fn tick(&mut self, fs_clock: bool) {
        if !self.power {
            return;
        }

        for _ in 0..4 {
            self.channel1.tick();
            self.channel2.tick();
            self.channel3.tick();
            self.channel4.tick();
        }

        if fs_clock {
            self.step_frame_sequencer();
        }

        self.sample_counter += 4;
        if self.sample_counter >= SAMPLE_PERIOD {
            self.sample_counter -= SAMPLE_PERIOD;
            self.emit_sample();
        }
    }

    fn step_frame_sequencer(&mut self) {
        let step = self.frame_sequencer_step;

        if step % 2 == 0 {
            self.channel1.tick_length();
            self.channel2.tick_length();
            self.channel3.tick_length();
            self.channel4.tick_length();
        }
        if step == 2 || step == 6 {
            self.channel1.tick_sweep();
        }
        if step == 7 {
            self.channel1.tick_envelope();
            self.channel2.tick_envelope();
            self.channel4.tick_envelope();
        }

        self.frame_sequencer_step = (self.frame_sequencer_step + 1) % 8;
    }

    /// Mixes the four channels into the single 8-bit sample the host callback expects.
    /// A channel only contributes if NR51 routes it to at least one ear; the two NR50
    /// master volumes are averaged since the output stream itself is mono.
    fn emit_sample(&mut self) {
        let c1 = self.channel1.amplitude();
        let c2 = self.channel2.amplitude();
        let c3 = self.channel3.amplitude();
        let c4 = self.channel4.amplitude();

        let mut mixed: i32 = 0;
        if self.panning.intersects(ChannelPanning::CH1_LEFT | ChannelPanning::CH1_RIGHT) {
            mixed += c1 as i32;
        }
        if self.panning.intersects(ChannelPanning::CH2_LEFT | ChannelPanning::CH2_RIGHT) {
            mixed += c2 as i32;
        }
        if self.panning.intersects(ChannelPanning::CH3_LEFT | ChannelPanning::CH3_RIGHT) {
            mixed += c3 as i32;
        }
        if self.panning.intersects(ChannelPanning::CH4_LEFT | ChannelPanning::CH4_RIGHT) {
            mixed += c4 as i32;
        }

        let master = (self.left_volume as i32 + self.right_volume as i32 + 2) / 2;
        let sample = 128 + (mixed * master) / 8;
        self.sample_buffer.push(sample.clamp(0, 255) as u8);
    }

    pub fn drain_samples(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.sample_buffer)
    }

    // --- register dispatch, per the standard 0xFF10-0xFF3F map ---

    pub fn read_register(&self, address: u16) -> u8 {
        match address {
            0xFF10 => self.channel1.read_sweep(),
            0xFF11 => self.channel1.read_nr1(),
            0xFF12 => self.channel1.envelope.register(),
            0xFF13 => 0xFF,
            0xFF14 => self.channel1.read_freq_hi(),
            0xFF16 => self.channel2.read_nr1(),
            0xFF17 => self.channel2.envelope.register(),
            0xFF18 => 0xFF,
            0xFF19 => self.channel2.read_freq_hi(),
            0xFF1A => self.channel3.read_nr30(),
            0xFF1B => 0xFF,
            0xFF1C => self.channel3.read_nr32(),
            0xFF1D => 0xFF,
            0xFF1E => self.channel3.read_freq_hi(),
            0xFF20 => 0xFF,
            0xFF21 => self.channel4.envelope.register(),
            0xFF22 => self.channel4.read_nr43(),
            0xFF23 => self.channel4.read_nr44(),
            0xFF24 => (self.left_volume << 4) | self.right_volume,
            0xFF25 => self.panning.bits(),
            0xFF26 => self.nr52(),
            0xFF30..=0xFF3F => self.channel3.read_wave_ram((address - 0xFF30) as usize),
            _ => 0xFF,
        }
    }

    pub fn write_register(&mut self, address: u16, value: u8) {
        if !self.power && address != 0xFF26 && !(0xFF30..=0xFF3F).contains(&address) {
            return;
        }
        match address {
            0xFF10 => self.channel1.write_sweep(value),
            0xFF11 => self.channel1.write_nr1(value),
            0xFF12 => self.channel1.write_nr2(value),
            0xFF13 => self.channel1.write_freq_lo(value),
            0xFF14 => self.channel1.write_freq_hi(value),
            0xFF16 => self.channel2.write_nr1(value),
            0xFF17 => self.channel2.write_nr2(value),
            0xFF18 => self.channel2.write_freq_lo(value),
            0xFF19 => self.channel2.write_freq_hi(value),
            0xFF1A => self.channel3.write_nr30(value),
            0xFF1B => self.channel3.write_nr31(value),
            0xFF1C => self.channel3.write_nr32(value),
            0xFF1D => self.channel3.write_freq_lo(value),
            0xFF1E => self.channel3.write_freq_hi(value),
            0xFF20 => self.channel4.write_nr41(value),
            0xFF21 => self.channel4.write_nr42(value),
            0xFF22 => self.channel4.write_nr43(value),
            0xFF23 => self.channel4.write_nr44(value),
            0xFF24 => {
                self.right_volume = value & 0x07;
                self.left_volume = (value >> 4) & 0x07;
            }
            0xFF25 => self.panning = ChannelPanning::from_bits_truncate(value),
            0xFF26 => self.write_nr52(value),
            0xFF30..=0xFF3F => self.channel3.write_wave_ram((address - 0xFF30) as usize, value),
            _ => {}
        }
    }

    fn nr52(&self) -> u8 {
        0x70
            | ((self.power as u8) << 7)
            | ((self.channel1.enabled as u8) << 0)
            | ((self.channel2.enabled as u8) << 1)
            | ((self.channel3.enabled as u8) << 2)
            | ((self.channel4.enabled as u8) << 3)
    }

    fn write_nr52(&mut self, value: u8) {
        let power = value & 0x80 != 0;
        if self.power && !power {
            #[cfg(feature = "apu-logging")]
            log::debug!("APU powered off, all channel/register state reset");
            *self = Apu { power: false, ..Apu::default() };
        }
        self.power = power;
    }
}
