use std::{process, sync::Arc, thread};

use clap::{Parser as ClapParser, ValueEnum};

use morph::{
    Context, ContextCreateInfo, Frame, FrameDescriptor, GraphNode, Literal,
    ReadLocal, ReadMode, RubyResult, Value, WriteLocal,
};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Scenario {
    Slots,
    Arrays,
    Shapes,
    Identity,
    All,
}

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Which storage scenario to run
    #[arg(value_enum, default_value_t = Scenario::All)]
    scenario: Scenario,

    #[arg(long, help = "Start every local slot as generic")]
    no_optimistic_locals: bool,

    #[arg(long, help = "Start every array with object storage")]
    no_optimistic_arrays: bool,

    #[arg(long, help = "Minimum capacity reserved when an array grows")]
    array_min_capacity: Option<usize>,

    #[arg(long, help = "Geometric growth factor for arrays")]
    array_growth_factor: Option<usize>,

    /// Threads racing on shared objects
    #[arg(long, default_value_t = 4)]
    threads: usize,
}

fn slots(ctx: &Context) {
    let descriptor = FrameDescriptor::new(&["x", "y"], ctx.settings());
    let mut frame = Frame::new(descriptor.clone());
    let read = ReadLocal::new(0);

    frame.write(0, Value::from(5));
    println!("x = {} as {}", read.execute(&mut frame), frame.kind(0));
    frame.write(0, Value::string("x"));
    println!("x = {} as {}", read.execute(&mut frame), frame.kind(0));

    let write = WriteLocal::new(1, Box::new(Literal(Value::from(2.5))));
    let mut other = Frame::new(descriptor);
    write.execute(&mut other);
    println!("y = {} as {}", other.read_generic(1), other.kind(1));
}

fn arrays(ctx: &Context) -> RubyResult<()> {
    let object = ctx.new_array(vec![Value::from(1), Value::from(2), Value::from(3)]);
    let Some(array) = object.as_array() else {
        return Ok(());
    };
    println!("{:?} as {}", array.to_vec(), array.storage_kind());
    array.write_at(3, Value::from(2.5))?;
    println!("{:?} as {}", array.to_vec(), array.storage_kind());
    println!("out of bounds: {}", array.read_at(10));
    array.push(Value::string("mixed"));
    println!("{:?} as {}", array.to_vec(), array.storage_kind());
    if let Err(err) = array.write_at(usize::MAX, Value::Nil) {
        println!("{}: {err}", err.exception_class());
    }
    Ok(())
}

fn shapes(ctx: &Arc<Context>, threads: usize) -> RubyResult<()> {
    let point = ctx.define_class("Point", &ctx.core().object);
    let a = ctx.allocate(&point);
    let b = ctx.allocate(&point);
    for object in [&a, &b] {
        object.set_property("@x", Value::from(1))?;
        object.set_property("@y", Value::from(2))?;
    }
    println!(
        "A.shape = {}, B.shape = {}",
        a.shape().id().as_raw(),
        b.shape().id().as_raw()
    );

    let handles = (0..threads)
        .map(|t| {
            let ctx = ctx.clone();
            let point = point.clone();
            thread::spawn(move || -> RubyResult<()> {
                for i in 0..1000 {
                    let p = ctx.allocate(&point);
                    p.set_property("@x", Value::from(i))?;
                    p.set_property("@y", Value::from(t as i64))?;
                }
                Ok(())
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        match handle.join() {
            Ok(result) => result?,
            Err(_) => eprintln!("worker panicked"),
        }
    }
    println!(
        "{} shapes, {} transitions after {} allocations",
        ctx.shapes().shape_count(),
        ctx.shapes().transition_count(),
        threads * 1000 + 2
    );

    a.set_property("@x", Value::from(0.5))?;
    println!(
        "@x = {} in shape {}",
        a.get_property("@x", ReadMode::ReadOrFail)?,
        a.shape().id().as_raw()
    );
    Ok(())
}

fn identity(ctx: &Context) -> RubyResult<()> {
    let point = ctx.define_class("Point", &ctx.core().object);
    let p = ctx.allocate(&point);
    p.set_property("@x", Value::from(1))?;
    println!("object id {}", p.get_or_assign_object_id());

    let singleton = p.get_or_assign_singleton_class(ctx)?;
    println!("singleton class {}", singleton.name());

    p.freeze();
    if let Err(err) = p.set_property("@x", Value::from(2)) {
        println!("{}: {err}", err.exception_class());
    }
    println!("singleton frozen: {}", singleton.is_frozen());

    if let Err(err) = ctx.singleton_class_of(&Value::from(1)) {
        println!("{}: {err}", err.exception_class());
    }

    let mut reachable = 0;
    p.visit_graph(&mut |_: &GraphNode| {
        reachable += 1;
        true
    });
    println!("{reachable} nodes reachable from the object");
    Ok(())
}

fn run(cli: &Cli, ctx: &Arc<Context>) -> RubyResult<()> {
    let all = cli.scenario == Scenario::All;
    if all || cli.scenario == Scenario::Slots {
        slots(ctx);
    }
    if all || cli.scenario == Scenario::Arrays {
        arrays(ctx)?;
    }
    if all || cli.scenario == Scenario::Shapes {
        shapes(ctx, cli.threads.max(1))?;
    }
    if all || cli.scenario == Scenario::Identity {
        identity(ctx)?;
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let ctx = Context::new(ContextCreateInfo {
        optimistic_locals: Some(!cli.no_optimistic_locals),
        optimistic_arrays: Some(!cli.no_optimistic_arrays),
        array_min_capacity: cli.array_min_capacity,
        array_growth_factor: cli.array_growth_factor,
    });

    if let Err(err) = run(&cli, &ctx) {
        eprintln!("{}: {err}", err.exception_class());
        process::exit(1);
    }
}
