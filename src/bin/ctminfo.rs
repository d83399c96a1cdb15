//! ctm info - A tool for inspecting compact mesh container files.
//!
//! Similar to exiftool for images, ctminfo reports header metadata, mesh
//! shape, and (optionally) decodes the mesh and animation frames to confirm
//! the file is well-formed.

use clap::{Parser, Subcommand};
use colored::*;
use octm::array_view::ElementKind;
use octm::container::{BindTarget, Context, MapProperty, Mode, Property};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ctminfo")]
#[command(about = "Inspect compact mesh container files", long_about = None)]
#[command(version)]
struct Cli {
    /// Container file to inspect
    #[arg(value_name = "FILE")]
    file: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show header and mesh shape (default)
    Info,

    /// Decode the mesh and every animation frame, reporting any error
    Verify,
}

fn main() {
    let cli = Cli::parse();

    let data = match fs::read(&cli.file) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error reading file: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Info) | None => show_info(&data),
        Some(Commands::Verify) => verify_file(&data),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn format_bytes(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let b = bytes as f64;
    if b >= GB {
        format!("{:.2} GB", b / GB)
    } else if b >= MB {
        format!("{:.2} MB", b / MB)
    } else if b >= KB {
        format!("{:.2} KB", b / KB)
    } else {
        format!("{} Bytes", bytes)
    }
}

fn format_number(n: u32) -> String {
    let s = n.to_string();
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::new();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            result.push(' ');
        }
        result.push(*c);
    }
    result
}

/// Opens an import context over `data` and reads just the header. The
/// returned context has no arrays bound yet, so its lifetime parameter is
/// free to unify with whatever buffers the caller binds afterward.
fn open_header<'a>(data: &[u8]) -> Result<(Context<'a>, usize), String> {
    let mut ctx = Context::new(Mode::Import);
    let mut cursor = 0usize;
    {
        let mut read_cb = |out: &mut [u8]| {
            let n = out.len().min(data.len() - cursor);
            out[..n].copy_from_slice(&data[cursor..cursor + n]);
            cursor += n;
            n
        };
        ctx.open_read_custom(&mut read_cb)
            .map_err(|_| describe_error(&mut ctx))?;
    }
    Ok((ctx, cursor))
}

fn describe_error(ctx: &mut Context) -> String {
    ctx.get_error()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "unknown error".to_string())
}

fn show_info(data: &[u8]) -> Result<(), String> {
    let (ctx, _) = open_header(data)?;

    println!("{}", "Compact Mesh Container".cyan().bold());
    println!(
        "{} ({} Bytes)",
        format_bytes(data.len()).yellow(),
        format_number(data.len() as u32).truecolor(64, 50, 255)
    );
    println!();

    let vertex_count = ctx.get_integer(Property::VertexCount).unwrap();
    let triangle_count = ctx.get_integer(Property::TriangleCount).unwrap();
    let uv_count = ctx.get_integer(Property::UvMapCount).unwrap();
    let attrib_count = ctx.get_integer(Property::AttribMapCount).unwrap();
    let has_normals = ctx.get_boolean(Property::HasNormals).unwrap();
    let frame_count = ctx.get_integer(Property::FrameCount).unwrap();
    let comment = ctx.get_string(Property::FileComment).unwrap();

    println!(" {} {}", "Vertices:".cyan(), format_number(vertex_count as u32).white());
    println!(" {} {}", "Triangles:".cyan(), format_number(triangle_count as u32).white());
    println!(" {} {}", "Normals:".cyan(), has_normals.to_string().white());
    println!(" {} {}", "UV maps:".cyan(), uv_count.to_string().white());
    println!(" {} {}", "Attribute maps:".cyan(), attrib_count.to_string().white());
    println!(" {} {}", "Animation frames:".cyan(), frame_count.to_string().white());
    if !comment.is_empty() {
        println!(" {} {}", "Comment:".cyan(), comment.white());
    }

    Ok(())
}

/// Decodes the mesh and every remaining frame into scratch buffers, just to
/// exercise the full read path; the decoded contents are not displayed.
fn verify_file(data: &[u8]) -> Result<(), String> {
    println!("Verifying container...\n");

    let (mut ctx, mut cursor) = open_header(data)?;

    let vertex_count = ctx.get_integer(Property::VertexCount).unwrap() as u32;
    let triangle_count = ctx.get_integer(Property::TriangleCount).unwrap() as u32;
    let has_normals = ctx.get_boolean(Property::HasNormals).unwrap();
    let uv_count = ctx.get_integer(Property::UvMapCount).unwrap() as u32;
    let attrib_count = ctx.get_integer(Property::AttribMapCount).unwrap() as u32;
    let frame_count = ctx.get_integer(Property::FrameCount).unwrap() as u32;

    println!("✓ Header parsed: {} vertices, {} triangles", vertex_count, triangle_count);

    let mut index_buf = vec![0u8; triangle_count as usize * 3 * 4];
    let mut vertex_buf = vec![0u8; vertex_count as usize * 3 * 4];
    let mut normal_buf = vec![0u8; if has_normals { vertex_count as usize * 3 * 4 } else { 0 }];
    let mut uv_bufs: Vec<Vec<u8>> = (0..uv_count)
        .map(|_| vec![0u8; vertex_count as usize * 2 * 4])
        .collect();
    let attrib_components: Vec<u32> = (0..attrib_count)
        .map(|i| ctx.get_attrib_map_float(i + 1, MapProperty::Components).unwrap() as u32)
        .collect();
    let mut attrib_bufs: Vec<Vec<u8>> = attrib_components
        .iter()
        .map(|&c| vec![0u8; vertex_count as usize * c as usize * 4])
        .collect();

    ctx.bind_array_import(BindTarget::Indices, &mut index_buf, 3, ElementKind::U32, 0)
        .map_err(|_| describe_error(&mut ctx))?;
    ctx.bind_array_import(BindTarget::Vertices, &mut vertex_buf, 3, ElementKind::F32, 0)
        .map_err(|_| describe_error(&mut ctx))?;
    if has_normals {
        ctx.bind_array_import(BindTarget::Normals, &mut normal_buf, 3, ElementKind::F32, 0)
            .map_err(|_| describe_error(&mut ctx))?;
    }
    for (i, buf) in uv_bufs.iter_mut().enumerate() {
        ctx.bind_array_import(BindTarget::UvMap(i as u32 + 1), buf, 2, ElementKind::F32, 0)
            .map_err(|_| describe_error(&mut ctx))?;
    }
    for (i, buf) in attrib_bufs.iter_mut().enumerate() {
        let components = attrib_components[i];
        ctx.bind_array_import(BindTarget::AttribMap(i as u32 + 1), buf, components, ElementKind::F32, 0)
            .map_err(|_| describe_error(&mut ctx))?;
    }

    {
        let mut read_cb = |out: &mut [u8]| {
            let n = out.len().min(data.len() - cursor);
            out[..n].copy_from_slice(&data[cursor..cursor + n]);
            cursor += n;
            n
        };
        ctx.read_mesh(&mut read_cb)
            .map_err(|_| format!("mesh decode failed: {}", describe_error(&mut ctx)))?;
    }
    println!("✓ Mesh decoded and passed integrity checks");

    for k in 1..frame_count {
        let t = {
            let mut read_cb = |out: &mut [u8]| {
                let n = out.len().min(data.len() - cursor);
                out[..n].copy_from_slice(&data[cursor..cursor + n]);
                cursor += n;
                n
            };
            ctx.read_next_frame(&mut read_cb)
                .map_err(|_| format!("frame {} decode failed: {}", k, describe_error(&mut ctx)))?
        };
        println!("✓ Frame {} decoded at t = {:.4}", k, t);
    }

    println!("\n{}", "ALL CHECKS PASSED".green().bold());
    Ok(())
}
