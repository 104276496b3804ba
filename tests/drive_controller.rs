#![cfg(feature = "adf")]
mod common;

use common::*;
use fluxfox_drive::{
    controller::StepDirection,
    file_parsers::adf::{AdfLayout, ADF_SECTOR_SIZE},
    load_disk,
    open_disk,
    prelude::*,
};
use std::io::Cursor;

const ADF_TRACK_SIZE: usize = 16 * ADF_SECTOR_SIZE;

fn patterned_image() -> Vec<u8> {
    (0..AdfLayout::S.image_len())
        .map(|i| (i % 251) as u8 ^ (i / ADF_TRACK_SIZE) as u8)
        .collect()
}

fn controller_with(disk: Disk) -> MfmController {
    let mut controller = MfmController::new(8_000_000);
    let inner = controller.controller_mut();
    let index = inner.insert_drive(Drive::default());
    assert!(inner.insert_disk(index, disk).is_ok());
    inner.set_drive(Some(index));
    inner.set_motor_on(true);
    controller.set_density(TrackDensity::Double);
    controller
}

fn step_to(controller: &mut MfmController, position: u16) {
    while controller.controller().drive().head_position() < position {
        controller.controller_mut().step(StepDirection::Inward);
    }
    while controller.controller().drive().head_position() > position {
        controller.controller_mut().step(StepDirection::Outward);
    }
}

#[test]
fn reads_sectors_from_loaded_image() {
    init();
    let data = patterned_image();
    let disk = load_disk(&mut Cursor::new(data.clone())).unwrap();
    let mut controller = controller_with(disk);
    step_to(&mut controller, 3);
    assert!(!controller.controller().is_track_zero());

    let mut budget = 20_000_000;
    wait_for(&mut controller, &mut budget, ControllerEvent::IndexHole);
    for s in 0..16usize {
        wait_for(&mut controller, &mut budget, ControllerEvent::Token(Token::Id));
        let id = read_bytes(&mut controller, &mut budget, 6);
        assert_eq!(&id[..4], &[3, 0, s as u8, 1]);
        assert_eq!(controller.crc(), 0);

        wait_for(&mut controller, &mut budget, ControllerEvent::Token(Token::Data));
        let field = read_bytes(&mut controller, &mut budget, ADF_SECTOR_SIZE + 2);
        assert_eq!(controller.crc(), 0, "sector {}", s);
        let offset = 3 * ADF_TRACK_SIZE + s * ADF_SECTOR_SIZE;
        assert_eq!(&field[..ADF_SECTOR_SIZE], &data[offset..offset + ADF_SECTOR_SIZE]);
    }
}

#[test]
fn formatted_track_is_written_back_to_file() {
    init();
    let path = temp_image_path("format.adf");
    std::fs::write(&path, patterned_image()).unwrap();

    let disk = open_disk(&path, true).unwrap();
    assert!(!disk.is_read_only());
    let mut controller = controller_with(disk);
    step_to(&mut controller, 7);

    let sectors = make_sectors(7, 0, 0, 16, 1);
    let mut budget = 20_000_000;
    wait_for(&mut controller, &mut budget, ControllerEvent::IndexHole);
    let mut writer = controller.begin_writing(true);
    writer.write_start_of_track();
    for sector in &sectors {
        writer.write_id_joiner();
        for byte in [sector.address.c(), sector.address.h(), sector.address.s(), sector.size] {
            writer.write_byte(byte);
        }
        writer.write_crc();
        writer.write_id_data_joiner(false);
        for byte in &sector.data {
            writer.write_byte(*byte);
        }
        writer.write_crc();
        writer.write_post_data_gap();
    }
    wait_for(&mut writer, &mut budget, ControllerEvent::DataWritten);
    writer.end_writing();

    // Leaving the track hands it back to the disk; dropping the disk flushes it to the file.
    step_to(&mut controller, 0);
    let disk = controller.controller_mut().eject_disk(0).unwrap();
    assert!(disk.is_dirty());
    drop(disk);

    let written = std::fs::read(&path).unwrap();
    let original = patterned_image();
    for sector in &sectors {
        let offset = 7 * ADF_TRACK_SIZE + sector.address.s() as usize * ADF_SECTOR_SIZE;
        assert_eq!(&written[offset..offset + ADF_SECTOR_SIZE], &sector.data[..]);
    }
    // Other tracks are untouched.
    assert_eq!(&written[..7 * ADF_TRACK_SIZE], &original[..7 * ADF_TRACK_SIZE]);
    assert_eq!(&written[8 * ADF_TRACK_SIZE..], &original[8 * ADF_TRACK_SIZE..]);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn read_only_image_keeps_writes_in_memory() {
    init();
    let disk = load_disk(&mut Cursor::new(patterned_image())).unwrap();
    assert!(disk.is_read_only());
    let mut controller = controller_with(disk);

    let mut budget = 20_000_000;
    wait_for(&mut controller, &mut budget, ControllerEvent::IndexHole);
    let mut writer = controller.begin_writing(true);
    writer.write_start_of_track();
    writer.write_n_bytes(2000, 0x4E);
    wait_for(&mut writer, &mut budget, ControllerEvent::DataWritten);
    writer.end_writing();

    // The written gap wiped the first sectors; the drive sees its own write after stepping away
    // and back.
    step_to(&mut controller, 1);
    step_to(&mut controller, 0);
    let track = controller.controller().drive().current_track();
    let sectors = decode_sectors(&track, TrackDensity::Double);
    assert!(sectors.len() < 16);
    assert!(sectors.iter().all(|sector| sector.address.s() > 0));
}
