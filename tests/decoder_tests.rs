//! Integration tests for the S.BUS frame decoder.

use interlock::sbus::{
    decode, DecodeError, RawFrame, SbusFrame, CHANNEL_BIT_WIDTH, CHANNEL_COUNT, END_BYTE,
    FLAG_CH17, FLAG_CH18, FLAG_FAILSAFE, FLAG_FRAME_LOST, FRAME_LEN, START_BYTE,
};

/// Packs raw channel values into the wire layout: 11 bits each, LSB-first
/// across bytes 1..=22.
fn pack(channels: [u16; CHANNEL_COUNT], flags: u8) -> RawFrame {
    let mut raw = [0u8; FRAME_LEN];
    raw[0] = START_BYTE;
    raw[FRAME_LEN - 2] = flags;
    raw[FRAME_LEN - 1] = END_BYTE;
    for (channel, &value) in channels.iter().enumerate() {
        for bit in 0..CHANNEL_BIT_WIDTH {
            if value & (1 << bit) != 0 {
                let abs_bit = channel * CHANNEL_BIT_WIDTH + bit;
                raw[1 + abs_bit / 8] |= 1 << (abs_bit % 8);
            }
        }
    }
    raw
}

#[test]
fn test_decode_neutral_sticks() {
    // Transmitter center position on every channel.
    let raw = pack([992; CHANNEL_COUNT], 0);
    let frame = decode(&raw).unwrap();
    assert_eq!(frame.channels, [1000; CHANNEL_COUNT]);
    assert!(!frame.failsafe);
    assert!(!frame.frame_lost);
    assert!(!frame.ch17);
    assert!(!frame.ch18);
}

#[test]
fn test_decode_distinct_channel_values() {
    let mut channels = [992u16; CHANNEL_COUNT];
    channels[0] = 172;
    channels[1] = 1811;
    channels[15] = 500;
    let frame = decode(&pack(channels, 0)).unwrap();
    assert_eq!(frame.channels[0], 0);
    assert_eq!(frame.channels[1], 1999);
    assert_eq!(frame.channels[15], (500 - 172) * 122 / 100);
}

#[test]
fn test_decode_clips_to_calibration_window() {
    let mut channels = [992u16; CHANNEL_COUNT];
    channels[3] = 160; // sane but below the calibration window
    channels[4] = 1900; // sane but above it
    let frame = decode(&pack(channels, 0)).unwrap();
    assert_eq!(frame.channels[3], 0);
    assert_eq!(frame.channels[4], 1999);
}

#[test]
fn test_digital_channels_and_frame_lost() {
    let frame = decode(&pack([992; CHANNEL_COUNT], FLAG_CH17 | FLAG_FRAME_LOST)).unwrap();
    assert!(frame.ch17);
    assert!(!frame.ch18);
    assert!(frame.frame_lost);
    assert!(!frame.failsafe);

    let frame = decode(&pack([992; CHANNEL_COUNT], FLAG_CH18)).unwrap();
    assert!(frame.ch18);
}

#[test]
fn test_failsafe_overrides_payload() {
    // Payload carries full-deflection values; none of them may survive.
    let frame = decode(&pack([1811; CHANNEL_COUNT], FLAG_FAILSAFE)).unwrap();
    assert_eq!(frame, SbusFrame::neutral());
    assert!(frame.failsafe);
    assert!(frame.frame_lost);
}

#[test]
fn test_bad_framing_rejected() {
    let mut raw = pack([992; CHANNEL_COUNT], 0);
    raw[0] = 0x0E;
    assert_eq!(decode(&raw), Err(DecodeError::BadFraming));

    let mut raw = pack([992; CHANNEL_COUNT], 0);
    raw[FRAME_LEN - 1] = 0xFF;
    assert_eq!(decode(&raw), Err(DecodeError::BadFraming));
}

#[test]
fn test_reserved_flag_bits_rejected() {
    for bit in 4..8 {
        let raw = pack([992; CHANNEL_COUNT], 1 << bit);
        assert_eq!(decode(&raw), Err(DecodeError::BadFlags));
    }
}

#[test]
fn test_out_of_sanity_channel_rejects_whole_frame() {
    let mut channels = [992u16; CHANNEL_COUNT];
    channels[7] = 149;
    assert_eq!(
        decode(&pack(channels, 0)),
        Err(DecodeError::ChannelOutOfSanityRange)
    );

    channels[7] = 1951;
    assert_eq!(
        decode(&pack(channels, 0)),
        Err(DecodeError::ChannelOutOfSanityRange)
    );

    // A truly wild value (corrupted high bits) is caught the same way.
    channels[7] = 0x7FF;
    assert_eq!(
        decode(&pack(channels, 0)),
        Err(DecodeError::ChannelOutOfSanityRange)
    );
}

#[test]
fn test_sanity_window_edges_accepted() {
    let mut channels = [992u16; CHANNEL_COUNT];
    channels[0] = 150;
    channels[1] = 1950;
    let frame = decode(&pack(channels, 0)).unwrap();
    assert_eq!(frame.channels[0], 0);
    assert_eq!(frame.channels[1], 1999);
}
