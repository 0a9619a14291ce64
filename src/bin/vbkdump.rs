//! Command-line front-end for `vbkreader`.

use anyhow::{Context, Result};
use argh::FromArgs;

use vbkreader::descriptor::FibEntry;
use vbkreader::props::PropValue;
use vbkreader::{DirItem, Parser};

#[derive(FromArgs)]
#[argh(description = "dump the structure of a Veeam Backup (VBK/VIB) file")]
struct Args {
    #[argh(positional, description = "path to the backup file")]
    path: String,

    #[argh(
        switch,
        short = 'v',
        description = "walk and print block/storage resolution for each file"
    )]
    validate_blocks: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args: Args = argh::from_env();

    let parser = Parser::open(&args.path)
        .with_context(|| format!("failed to open {}", args.path))?;

    let header = parser.header();
    println!("file: {}", args.path);
    println!("header:");
    println!("  version: 0x{:x}", header.version);
    println!("  inited: {}", header.inited);
    println!("  digest: {}", header.digest_type);
    println!("  slot_fmt: {}", header.slot_fmt);
    println!(
        "  block_size: 0x{:x} ({} bytes)",
        header.standard_block_size, header.standard_block_size
    );
    println!("  max_banks: 0x{:x}", header.max_banks());
    println!("  slot_size: 0x{:x}", header.slot_size());
    println!();

    for (idx, slot) in parser.slots().iter().enumerate() {
        let active = if idx == parser.active_slot_index() { " (active)" } else { "" };
        println!("slot {idx} @ 0x{:x}{active}", slot.offset);
        println!("  crc: 0x{:08x}", slot.crc);
        println!("  has_snapshot: {}", slot.has_snapshot);
        println!("  valid: {}", slot.valid_fast());
        println!("  snap_ver: 0x{:x}", slot.snapshot_desc.version);
        println!("  storage_eof: 0x{:x}", slot.snapshot_desc.storage_eof);
        println!("  banks: {}", slot.allocated_banks);
    }
    println!();

    let root = parser.active_slot().snapshot_desc.obj_refs.meta_root_dir_page;
    println!("directory tree:");
    print_directory(&parser, root, 0, args.validate_blocks)?;

    Ok(())
}

fn print_directory(
    parser: &Parser,
    ppi: vbkreader::PhysPageId,
    indent: usize,
    validate_blocks: bool,
) -> Result<()> {
    let pad = "  ".repeat(indent);
    for item in parser.read_dir_items(ppi) {
        if item.is_dir() {
            println!("{pad}[{}] {}/", item.file_type, item.name);
            if let Some(children) = item.children_loc {
                println!(
                    "{pad}  loc: {:04x}:{:04x}",
                    children.bank_id, children.page_id
                );
                println!("{pad}  children: {}", item.children_num);
                print_props(parser, &item, indent);
                print_directory(parser, children, indent + 1, validate_blocks)?;
            }
        } else {
            println!("{pad}[{}] {}  (fib_size={})", item.file_type, item.name, item.fib_size);
            print_props(parser, &item, indent);
            if validate_blocks {
                print_block_validation(parser, &item, indent + 1);
            }
        }
    }
    Ok(())
}

fn print_props(parser: &Parser, item: &DirItem, indent: usize) {
    if !item.props_loc.valid() {
        return;
    }
    let Some(dict) = parser.read_props_dictionary(item.props_loc) else {
        return;
    };
    if !dict.is_present() {
        return;
    }
    let pad = "  ".repeat(indent);
    println!("{pad}  props:");
    for (key, value) in &dict.properties {
        match value {
            PropValue::Bytes(bytes) if bytes.len() > 50 => {
                println!("{pad}    {key}: [{} bytes]", bytes.len());
            }
            PropValue::Bytes(bytes) => {
                println!("{pad}    {key}: {}", hex::encode(bytes));
            }
            PropValue::Str(s) if s.len() > 100 => {
                let preview: String = s.chars().take(50).collect();
                println!("{pad}    {key}: [{} chars] {preview}...", s.len());
            }
            PropValue::Str(s) => println!("{pad}    {key}: {s}"),
            PropValue::Int(v) => println!("{pad}    {key}: {v}"),
            PropValue::UInt64(v) => println!("{pad}    {key}: {v}"),
            PropValue::Bool(v) => println!("{pad}    {key}: {v}"),
        }
    }
}

fn print_block_validation(parser: &Parser, item: &DirItem, indent: usize) {
    let pad = "  ".repeat(indent);
    println!("{pad}block validation:");

    if item.file_type.is_increment() {
        let blocks = parser.read_patch_block_descriptors(item);
        for block in blocks.iter().take(5) {
            println!("{pad}- size: {} bytes", block.size);
            println!("{pad}  loc_type: {}", block.loc_type);
            println!("{pad}  digest: {}", hex::encode(block.digest));
            println!("{pad}  dsid: {}", block.id);
            println!("{pad}  block_off: {} (x BLOCK_SIZE)", block.offset);
            if let Some(stg) = parser.get_datastore_block(block.id) {
                println!("{pad}  storage:");
                println!("{pad}    loc: {}", stg.location);
                println!("{pad}    off: 0x{:x}", stg.offset);
                println!("{pad}    comp: {}", stg.comp_type);
                println!("{pad}    comp_size: {} bytes", stg.comp_size);
                println!("{pad}    output size: {} bytes", stg.src_size);
                println!("{pad}    digest: {}", hex::encode(stg.digest));
            }
        }
    } else {
        let blocks = parser.read_file_block_descriptors(item);
        let non_sparse = blocks
            .iter()
            .filter(|b| !matches!(b, FibEntry::Sparse))
            .count();
        println!("{pad}total blocks: {} ({non_sparse} non-sparse)", blocks.len());
    }
}
