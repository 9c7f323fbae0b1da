//! Loading a hexadecimal image, running it and reading the results back.

use sigma::{disassemble, parse_image, Cpu, CpuRunner, CpuState, MachineConfig};

const PROGRAM: &str = "
; sum the words at .100 and .101 into .102
@26
32100100    ; LW,1 .100
30100101    ; AW,1 .101
35100102    ; STW,1 .102
2E000000    ; WAIT
@100
.0000000A .00000005
";

fn machine() -> Cpu {
    Cpu::new(MachineConfig {
        clock_interval_ms: 0,
        ..MachineConfig::default()
    })
}

#[test]
fn test_image_runs_to_wait() {
    let image = parse_image(PROGRAM, 0x26).unwrap();
    assert_eq!(image.len(), 6);
    assert_eq!(image.origin(), Some(0x26));

    let mut cpu = machine();
    image.load_into(&mut cpu).unwrap();
    let executed = cpu.run().unwrap();
    assert_eq!(executed, 4);
    assert_eq!(cpu.state(), CpuState::Waiting);
    assert_eq!(cpu.read_word(0x102), Some(15));
}

#[test]
fn test_image_disassembles() {
    let image = parse_image(PROGRAM, 0x26).unwrap();
    let listing = disassemble(&image.segments[0].words, image.segments[0].origin);
    let lines: Vec<&str> = listing.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with(".00026  32100100  LW,1"));
    assert!(lines[3].contains("WAIT"));
}

#[test]
fn test_breakpoint_then_continue_on_runner() {
    let image = parse_image(PROGRAM, 0x26).unwrap();
    let mut cpu = machine();
    image.load_into(&mut cpu).unwrap();
    cpu.set_breakpoint(0x28, 1);
    cpu.run().unwrap();
    assert_eq!(cpu.state(), CpuState::Stopped);
    assert_eq!(cpu.psd().ia, 0x28);
    assert_eq!(cpu.register(1), 15);

    let runner = CpuRunner::spawn(cpu);
    let snap = runner.step(1).unwrap();
    assert_eq!(snap.psd.ia, 0x29);
    let cpu = runner.shutdown().unwrap();
    assert_eq!(cpu.read_word(0x102), Some(15));
}
