#![allow(clippy::unusual_byte_groupings)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lc3::assembler::{Generator, Parser};
use lc3::config::EmulatorConfig;
use lc3::cpu::Cpu;
use lc3::loader::{Loader, ObjectCode};
use lc3::memory::PrivilegeLevel;
use lc3::word::Word;

const TEST_PROGRAM: &str = r#"
    .ORIG x3000
    ADD R1, R1, #5
    ADD R2, R1, R1
    AND R3, R1, #3
    AND R4, R2, R1
    NOT R5, R1

    LD R6, DATA1
    LDR R7, R0, #5
    LDI R1, PTRDATA
    LEA R2, LOOP
    ST R1, RESULT
    STR R2, R0, #6
    STI R3, PTRRESULT

    LOOP:
        ADD R4, R4, #1
        BRz SKIP
        BRnp CONTINUE
    SKIP:
        JSR SUBROUTINE
        BR NEXT
    CONTINUE:
        JSRR R2
    NEXT:
        JMP R7

    SUBROUTINE:
        RET

    TRAP x25

    DATA1: .FILL x1234
    RESULT: .BLKW 1
    PTRDATA: .FILL DATA1
    PTRRESULT: .FILL RESULT
    .END
"#;

fn assemble(source: &str) -> ObjectCode {
    let (symbols, lines, errors) = Parser::parse(source);
    assert!(errors.is_empty(), "{errors:?}");
    Generator::new(&lines).generate(&symbols).unwrap()
}

fn criterion_benchmark(c: &mut Criterion) {
    let obj = assemble(TEST_PROGRAM);
    let mut group = c.benchmark_group("lc3");

    group.bench_function("run_to_halt", |b| {
        b.iter_batched(
            || {
                let mut cpu = Cpu::new(EmulatorConfig::default());
                Loader::new(cpu.memory_mut()).load(black_box(&obj)).unwrap();
                cpu.r[6].set(0x2FFF);
                cpu.pc.set(obj.orig);
                cpu
            },
            |mut cpu| {
                black_box(cpu.run());
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.bench_function("add_immediate", |b| {
        b.iter_batched(
            || {
                let mut cpu = Cpu::new(EmulatorConfig::default());
                cpu.r[1].set(5);
                // ADD R0, R1, #3
                let obj = ObjectCode::new(0x3000, vec![0b0001_000_001_1_00011]);
                Loader::new(cpu.memory_mut()).load(&obj).unwrap();
                cpu.pc.set(0x3000);
                cpu.start_running();
                cpu
            },
            |mut cpu| {
                black_box(cpu.step());
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.bench_function("and_register", |b| {
        b.iter_batched(
            || {
                let mut cpu = Cpu::new(EmulatorConfig::default());
                cpu.r[1].set(0x00FF);
                cpu.r[2].set(0x0F0F);
                // AND R3, R1, R2
                let obj = ObjectCode::new(0x3000, vec![0b0101_011_001_000_010]);
                Loader::new(cpu.memory_mut()).load(&obj).unwrap();
                cpu.pc.set(0x3000);
                cpu.start_running();
                cpu
            },
            |mut cpu| {
                black_box(cpu.step());
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.bench_function("branch_taken", |b| {
        b.iter_batched(
            || {
                let mut cpu = Cpu::new(EmulatorConfig::default());
                cpu.pc.set(0x3000);
                // AND R0,R0,#0 to force Z, then BRz #2
                let obj =
                    ObjectCode::new(0x3000, vec![0b0101_000_000_1_00000, 0b0000_010_000000010]);
                Loader::new(cpu.memory_mut()).load(&obj).unwrap();
                cpu.start_running();
                cpu.step();
                cpu
            },
            |mut cpu| {
                black_box(cpu.step());
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.bench_function("load_indirect", |b| {
        b.iter_batched(
            || {
                let mut cpu = Cpu::new(EmulatorConfig::default());
                cpu.pc.set(0x3000);
                // LDI R0, #1 -> pointer at 0x3002 -> value at 0x4000
                let obj = ObjectCode::new(0x3000, vec![0b1010_000_000000001]);
                Loader::new(cpu.memory_mut()).load(&obj).unwrap();
                cpu.memory_mut()
                    .store(0x3002, Word::new(0x4000), PrivilegeLevel::System)
                    .unwrap();
                cpu.memory_mut()
                    .store(0x4000, Word::new(0x1234), PrivilegeLevel::System)
                    .unwrap();
                cpu.start_running();
                cpu
            },
            |mut cpu| {
                black_box(cpu.step());
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.bench_function("assemble_program", |b| {
        b.iter_batched(
            || TEST_PROGRAM,
            |source| {
                black_box(assemble(source));
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
