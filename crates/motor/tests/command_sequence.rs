//! End-to-end command traffic of the controller over an in-memory line.

use std::time::Duration;

use motor::{
    MemoryLink, MotorController, MotorError, MotorSettings, OperatingMode, ProtocolError,
    SerialChannel,
};

fn controller(link: &MemoryLink) -> MotorController<MemoryLink> {
    let channel = SerialChannel::with_link(link.clone(), "test", Duration::ZERO);
    let settings = MotorSettings {
        shutdown_settle: Duration::ZERO,
        ..MotorSettings::default()
    };
    MotorController::new(channel, settings)
}

#[test]
fn position_move_sequence() {
    let link = MemoryLink::new();
    let mut motor = controller(&link);
    link.clear_written();

    motor.set_mode(OperatingMode::Position).unwrap();
    motor.set_velocity(10.0).unwrap();
    motor.set_acceleration(5.0).unwrap();
    motor.go_absolute_position(100.0).unwrap();

    assert_eq!(link.commands(), vec!["MP", "VT=327680", "ADT=20", "PT=400 G"]);
    assert_eq!(link.written(), b"MP\rVT=327680\rADT=20\rPT=400 G\r");
}

#[test]
fn full_session_ends_de_energized() {
    let link = MemoryLink::new();
    {
        let mut motor = controller(&link);
        motor.set_mode(OperatingMode::Velocity).unwrap();
        motor.set_velocity(-2.5).unwrap();
        motor.go().unwrap();
        link.push_reply("-81920\r");
        assert_eq!(motor.get_velocity().unwrap(), -2.5);
    }

    let commands = link.commands();
    assert_eq!(
        commands,
        vec![
            "EIGN(2) EIGN(3) ZS MP",
            "VT=327680",
            "ADT=20",
            "MV",
            "VT=-81920",
            "G",
            "RVC",
            "MV",
            "VT=0",
            "G",
            "OFF",
        ]
    );
}

#[test]
fn stale_bytes_do_not_leak_into_replies() {
    let link = MemoryLink::new();
    let mut motor = controller(&link);
    link.inject_stale("12345\r");
    link.push_reply("8\r");
    assert_eq!(motor.get_position().unwrap(), 2.0);
}

#[test]
fn empty_reply_is_protocol_error_for_every_query() {
    let link = MemoryLink::new();
    let mut motor = controller(&link);

    type Getter = fn(&mut MotorController<MemoryLink>) -> motor::Result<f32>;
    let getters: [Getter; 5] = [
        MotorController::<MemoryLink>::get_position,
        MotorController::<MemoryLink>::get_velocity,
        MotorController::<MemoryLink>::get_target_velocity,
        MotorController::<MemoryLink>::get_acceleration,
        MotorController::<MemoryLink>::get_target_acceleration,
    ];
    for get in getters {
        match get(&mut motor) {
            Err(MotorError::Protocol(ProtocolError::EmptyReply)) => {}
            other => panic!("expected empty reply error, got {other:?}"),
        }
    }
}

#[test]
fn write_failure_is_not_fatal() {
    let link = MemoryLink::new();
    let mut motor = controller(&link);

    link.set_fail_writes(true);
    assert!(motor.go_absolute_position(10.0).unwrap_err().is_write());

    link.set_fail_writes(false);
    link.clear_written();
    motor.go_absolute_position(10.0).unwrap();
    assert_eq!(link.commands(), vec!["PT=40 G"]);
}
