use std::rc::Rc;

use log::{LevelFilter, Metadata, Record};
use runtrace::{
    format_listing, FrameSnapshot, Instruction, LineTable, LineTableBuilder, Monitor,
    StackReporter, StdoutOutput, TraceConfig, Value,
};

struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        eprintln!("[{}] {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

/// A code unit of the pretend program: its bytecode and line table.
struct Code {
    module: &'static str,
    name: &'static str,
    file: &'static str,
    body: Vec<Instruction>,
    lines: Vec<u8>,
}

impl Code {
    fn frame_at(&self, pc: usize, caller: Option<Rc<FrameSnapshot>>) -> FrameSnapshot {
        let instr = self.body[pc].clone();
        let line = LineTable::new(&self.lines).line_for_offset(instr.offset);
        let frame = FrameSnapshot::new(self.module, self.name, self.file)
            .with_line(line)
            .with_instruction(instr);
        match caller {
            Some(caller) => frame.called_from(caller),
            None => frame,
        }
    }
}

type Trace = Monitor<'static, &'static FrameSnapshot, StdoutOutput>;

/// Replays one activation of `code`, calling into `callee` at `call_at`.
fn run(
    monitor: &mut Trace,
    code: &Code,
    caller: Option<Rc<FrameSnapshot>>,
    call_at: Option<(usize, &Code)>,
    raise_at: Option<usize>,
) {
    // Frames are leaked so the monitor can borrow them for the whole run.
    let entry: &'static FrameSnapshot = Box::leak(Box::new(code.frame_at(0, caller.clone())));
    monitor.on_call(&entry);
    let mut last: &'static FrameSnapshot = entry;
    for pc in 0..code.body.len() {
        let frame: &'static FrameSnapshot = Box::leak(Box::new(code.frame_at(pc, caller.clone())));
        monitor.on_step(&frame);
        if raise_at == Some(pc) {
            monitor.on_exception(&frame, Some(&Value::Opaque("Exception('ExceptionallyLoud')".into())));
        }
        if let Some((at, callee)) = call_at {
            if at == pc {
                run(monitor, callee, Some(Rc::new(frame.clone())), None, None);
            }
        }
        last = frame;
    }
    monitor.on_return(&last, Some(&Value::None));
}

fn main() {
    log::set_logger(&LOGGER).expect("logger already set");
    log::set_max_level(LevelFilter::Info);

    let mut lines = LineTableBuilder::new();
    lines.push(4, 1).push(4, 1);
    let wack = Code {
        module: "__main__",
        name: "wack",
        file: "prof_runtrace.py",
        body: vec![
            Instruction::new(0, "LOAD_GLOBAL").with_name("print"),
            Instruction::new(2, "LOAD_CONST_STRING").with_const("Yo, this is wack!"),
            Instruction::new(4, "CALL_FUNCTION").with_const(1),
            Instruction::new(8, "RETURN_VALUE"),
        ],
        lines: lines.finish(),
    };

    let loader = Code {
        module: "importlib.util",
        name: "find_spec",
        file: "<frozen importlib.util>",
        body: vec![Instruction::new(0, "LOAD_FAST").with_const(0)],
        lines: LineTableBuilder::new().finish(),
    };

    let mut lines = LineTableBuilder::new();
    lines.push(2, 1).push(4, 2).push(6, 1);
    let main_code = Code {
        module: "__main__",
        name: "do",
        file: "prof_runtrace.py",
        body: vec![
            Instruction::new(0, "MAKE_FUNCTION").with_const(0x7f10),
            Instruction::new(2, "STORE_FAST").with_const(0),
            Instruction::new(6, "LOAD_FAST").with_const(0),
            Instruction::new(7, "CALL_FUNCTION").with_const(0),
            Instruction::new(12, "RAISE_VARARGS").with_const(1),
            Instruction::new(14, "RETURN_VALUE"),
        ],
        lines: lines.finish(),
    };

    for line in format_listing(main_code.name, &main_code.body) {
        println!("{}", line);
    }

    let mut monitor: Trace = Monitor::new(
        TraceConfig::default().with_numbered_instructions(true),
        StdoutOutput,
    );
    let default = monitor.default_handler();
    let stepper = monitor.register(StackReporter);
    monitor.install(Some(default)).expect("install failed");

    // The first call below gets the step-into observer.
    monitor.escalate(stepper).expect("escalation failed");
    run(&mut monitor, &main_code, None, Some((3, &wack)), Some(4));

    // Loader internals stay invisible.
    run(&mut monitor, &loader, None, None, None);

    monitor.uninstall();
    let summary = monitor.finish();
    log::info!("traced {} instructions", summary.instructions);
}
