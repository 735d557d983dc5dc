use sighook::Function;

fn main() -> Result<(), sighook::Error> {
    env_logger::init();

    let handler = sighook::global()?;
    let exit = handler.ensure_exit_hook()?;
    exit.add_function(Function::new("goodbye", |ctx| {
        println!("exiting ({:?}, code {})", ctx.exit_type, ctx.exit_code);
    }))?;

    println!("Waiting for Ctrl-C...");
    handler.run()
}
