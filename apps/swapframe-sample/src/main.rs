//! swapframe sample
//!
//! Opens a window and runs the double-buffered frame loop with one of the
//! frame bodies until the window is closed.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p swapframe-sample -- [OPTIONS]
//! ```
//!
//! The triangle variant needs shader compilation at build time:
//!
//! ```bash
//! cargo run -p swapframe-sample --features triangle -- --variant triangle
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod args;

use swapframe_app::run_app;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Check for help flag before starting the app
    if args.iter().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    run_app(args::parse(&args)?)
}

fn print_help() {
    eprintln!(
        "swapframe sample: double-buffered Vulkan frame loop

USAGE:
    cargo run -p swapframe-sample -- [OPTIONS]

OPTIONS:
    --variant <NAME>          Frame body: triangle, clear-pass, image-clear
                              Default: clear-pass (triangle needs --features triangle)
    --frames <N>              Exit after presenting N frames
    --size <W>x<H>            Window size (default: 1280x720)
    --fifo                    Use FIFO presentation instead of low-latency
    --fence-timeout-ms <MS>   Give up waiting on a frame slot after MS milliseconds
    --no-validation           Disable Vulkan validation layers
    --validation              Enable Vulkan validation layers (default in debug builds)
    -h, --help                Print this help message

EXAMPLES:
    # Clear the window through a render pass
    cargo run -p swapframe-sample

    # Transfer clear, vsync, 300 frames
    cargo run -p swapframe-sample -- --variant image-clear --fifo --frames 300

ENVIRONMENT VARIABLES:
    RUST_LOG                  Set log level (e.g., info, debug, trace)"
    );
}
