// Licensed under the Apache-2.0 license

mod common;

use common::*;
use registers_vdma::bits::ALL_IRQ_MASK;
use vdma_driver::hil::Direction;
use vdma_driver::{
    ChannelDescription, ChannelProvider, DeviceDescription, DmaRequest, Vdma, VdmaError, IP_VDMA,
};

#[test]
fn test_probe_builds_channels() {
    init_logger();
    let platform = TestPlatform::new(true, 3);
    let vdma = Vdma::probe(&platform, &dual_description()).unwrap();
    assert_eq!(vdma.node(), 7);
    assert!(vdma.has_sg());
    assert_eq!(vdma.num_frms(), 3);
    assert_eq!(vdma.channels().count(), 2);

    let mm2s = vdma.channel(0).unwrap();
    let s2mm = vdma.channel(1).unwrap();
    assert_eq!(mm2s.direction(), Direction::MemToDev);
    assert_eq!(s2mm.direction(), Direction::DevToMem);
    assert_eq!(mm2s.match_token(), 1 | IP_VDMA | (1 << 28));
    assert_eq!(s2mm.match_token(), 0x1040_0002);
    for chan in vdma.channels() {
        assert_eq!(chan.num_frms(), 3);
        assert!(!chan.is_in_use());
        assert_eq!(platform.ctrl(chan.id(), 0x00) & ALL_IRQ_MASK, ALL_IRQ_MASK);
    }
    assert_eq!(platform.vdma.resets(0), 1);
    assert_eq!(platform.vdma.resets(1), 1);
}

#[test]
fn test_probe_rejects_bad_descriptions() {
    init_logger();
    let platform = TestPlatform::new(true, 3);
    let bad = [
        mm2s_description(true, 0),
        mm2s_description(true, 17),
        DeviceDescription {
            channels: Vec::new(),
            ..mm2s_description(true, 3)
        },
        DeviceDescription {
            channels: vec![ChannelDescription::default(); 2],
            ..mm2s_description(true, 3)
        },
        DeviceDescription {
            channels: vec![ChannelDescription {
                device_id: 16,
                ..Default::default()
            }],
            ..mm2s_description(true, 3)
        },
        DeviceDescription {
            channels: vec![ChannelDescription {
                datawidth_bits: 0,
                ..Default::default()
            }],
            ..mm2s_description(true, 3)
        },
        DeviceDescription {
            desc_pool_slots: 2,
            ..mm2s_description(true, 3)
        },
    ];
    for desc in &bad {
        assert_eq!(
            Vdma::probe(&platform, desc).err(),
            Some(VdmaError::InvalidArgument)
        );
    }
}

#[test]
fn test_xlate() {
    init_logger();
    let platform = TestPlatform::new(true, 3);
    let vdma = Vdma::probe(&platform, &mm2s_description(true, 3)).unwrap();

    assert_eq!(vdma.xlate(&[0]).map(|c| c.id()), Ok(0));
    assert_eq!(vdma.xlate(&[1]).err(), Some(VdmaError::NotFound));
    assert_eq!(vdma.xlate(&[2]).err(), Some(VdmaError::InvalidArgument));
    assert_eq!(vdma.xlate(&[]).err(), Some(VdmaError::InvalidArgument));
    assert_eq!(vdma.xlate(&[0, 0]).err(), Some(VdmaError::InvalidArgument));
}

#[test]
fn test_request_and_release() {
    init_logger();
    let platform = TestPlatform::new(true, 3);
    let vdma = Vdma::probe(&platform, &dual_description()).unwrap();
    let mut provider = ChannelProvider::new();
    provider.register(&vdma).unwrap();
    assert_eq!(provider.register(&vdma), Err(VdmaError::Busy));
    assert_eq!(provider.channels().count(), 2);

    let req = DmaRequest {
        node: 7,
        args: &[1],
    };
    let handle = provider.request_channel(&req).unwrap();
    assert_eq!(handle.direction(), Direction::DevToMem);
    assert!(handle.is_in_use());
    assert_eq!(handle.free_descriptors(), 32);
    assert!(platform.ram.allocated() > 0);
    assert_eq!(
        provider.request_channel(&req).err(),
        Some(VdmaError::Busy)
    );
    assert_eq!(
        provider.request_by_token(0x1040_0002).err(),
        Some(VdmaError::Busy)
    );

    // Dropping the handle frees the descriptor pool.
    drop(handle);
    assert!(!vdma.channel(1).unwrap().is_in_use());
    assert_eq!(platform.ram.allocated(), 0);

    let handle = provider.request_by_token(0x1040_0002).unwrap();
    assert_eq!(handle.id(), 1);
    handle.release();
    assert_eq!(platform.ram.allocated(), 0);
}

#[test]
fn test_request_errors() {
    init_logger();
    let platform = TestPlatform::new(true, 3);
    let vdma = Vdma::probe(&platform, &mm2s_description(true, 3)).unwrap();
    let mut provider = ChannelProvider::new();
    provider.register(&vdma).unwrap();

    let request = |node, args: &[u32]| {
        provider
            .request_channel(&DmaRequest { node, args })
            .err()
    };
    assert_eq!(request(8, &[0]), Some(VdmaError::NotFound));
    assert_eq!(request(7, &[]), Some(VdmaError::InvalidArgument));
    assert_eq!(request(7, &[0, 1]), Some(VdmaError::InvalidArgument));
    assert_eq!(request(7, &[5]), Some(VdmaError::InvalidArgument));
    assert_eq!(request(7, &[1]), Some(VdmaError::NotFound));
    assert_eq!(
        provider.request_by_token(0x1040_0002).err(),
        Some(VdmaError::NotFound)
    );

    assert!(provider.unregister(7).is_some());
    assert!(provider.unregister(7).is_none());
    let req = DmaRequest {
        node: 7,
        args: &[0],
    };
    assert_eq!(
        provider.request_channel(&req).err(),
        Some(VdmaError::NotFound)
    );
}

#[test]
fn test_request_fails_without_memory() {
    init_logger();
    let platform = TestPlatform::new(true, 3);
    let vdma = Vdma::probe(&platform, &mm2s_description(true, 3)).unwrap();
    let mut provider = ChannelProvider::new();
    provider.register(&vdma).unwrap();

    platform.fail_allocations(true);
    let req = DmaRequest {
        node: 7,
        args: &[0],
    };
    assert_eq!(
        provider.request_channel(&req).err(),
        Some(VdmaError::OutOfMemory)
    );
    assert!(!vdma.channel(0).unwrap().is_in_use());

    platform.fail_allocations(false);
    assert!(provider.request_channel(&req).is_ok());
}

#[test]
fn test_remove_stops_everything() {
    init_logger();
    let platform = TestPlatform::new(true, 3);
    let client = Recorder::default();
    let vdma = Vdma::probe(&platform, &dual_description()).unwrap();
    {
        let chan = vdma.channel(0).unwrap();
        chan.alloc_chan_resources().unwrap();
        let mut tx = chan
            .prep_slave_sg(&frames(&FRAME_ADDRS), Direction::MemToDev)
            .unwrap();
        tx.set_callback(&client, 0);
        chan.submit(tx).unwrap();
        chan.issue_pending();
    }
    assert!(platform.vdma.is_busy(0));

    vdma.remove();
    assert!(!platform.vdma.is_busy(0));
    assert_eq!(platform.ctrl(0, 0x00) & 1, 0);
    assert_eq!(platform.ctrl(0, 0x00) & ALL_IRQ_MASK, 0);
    assert_eq!(platform.ctrl(1, 0x00) & ALL_IRQ_MASK, 0);
    assert_eq!(platform.ram.allocated(), 0);
    assert!(client.calls().is_empty());
}

#[cfg(feature = "serde")]
#[test]
fn test_description_from_json() {
    use vdma_driver::FlushFsync;

    init_logger();
    let desc: DeviceDescription = serde_json::from_str(
        r#"{
            "node": 3,
            "has_sg": true,
            "num_fstores": 2,
            "flush_fsync": 1,
            "channels": [
                { "direction": "mm2s", "datawidth_bits": 32, "include_dre": true },
                { "direction": "s2mm", "genlock": true, "device_id": 2 }
            ]
        }"#,
    )
    .unwrap();
    assert_eq!(desc.node, 3);
    assert_eq!(desc.flush_fsync, FlushFsync::Both);
    assert_eq!(desc.poll_limit, 1_000_000);
    assert_eq!(desc.desc_pool_slots, 256);
    assert_eq!(desc.channels.len(), 2);
    assert_eq!(desc.channels[1].datawidth_bits, 64);

    let platform = TestPlatform::new(true, 2);
    let vdma = Vdma::probe(&platform, &desc).unwrap();
    assert_eq!(vdma.copy_align(), 3);
    assert!(vdma.channels().all(|c| c.flush_on_fsync()));

    assert!(serde_json::from_str::<DeviceDescription>(r#"{ "flush_fsync": 4 }"#).is_err());
}

#[test]
fn test_transfer_from_previous_acquisition() {
    init_logger();
    let platform = TestPlatform::new(true, 3);
    let vdma = Vdma::probe(&platform, &mm2s_description(true, 3)).unwrap();
    let mut provider = ChannelProvider::new();
    provider.register(&vdma).unwrap();
    let req = DmaRequest {
        node: 7,
        args: &[0],
    };

    let handle = provider.request_channel(&req).unwrap();
    let stale = handle
        .prep_slave_sg(&frames(&FRAME_ADDRS), Direction::MemToDev)
        .unwrap();
    let stale_submit = handle
        .prep_slave_sg(&frames(&FRAME_ADDRS), Direction::MemToDev)
        .unwrap();
    drop(handle);

    let handle = provider.request_channel(&req).unwrap();
    let live = handle
        .prep_slave_sg(&frames(&FRAME_ADDRS), Direction::MemToDev)
        .unwrap();
    handle.free_tx_descriptor(stale);
    assert_eq!(handle.free_descriptors(), 29);
    assert_eq!(handle.submit(stale_submit), Err(VdmaError::InvalidArgument));
    assert_eq!(handle.free_descriptors(), 29);

    let other = handle
        .prep_slave_sg(&frames(&FRAME_ADDRS), Direction::MemToDev)
        .unwrap();
    for segment in other.segments() {
        assert!(live.segments().iter().all(|s| s.slot != segment.slot));
    }
    handle.free_tx_descriptor(live);
    handle.free_tx_descriptor(other);
    assert_eq!(handle.free_descriptors(), 32);
}
