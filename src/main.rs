use std::sync::Arc;

use log::info;

use shale::buffer::BufferPool;
use shale::catalog::Catalog;
use shale::common::{TransactionId, DEFAULT_BUFFER_POOL_SIZE};
use shale::tuple::{DataType, Schema, TupleBuilder, Value};

fn main() -> shale::Result<()> {
    env_logger::init();

    println!("Shale - page cache, page locks and heap files");
    println!("==============================================\n");

    let db_path = std::env::temp_dir().join("shale_demo.dat");
    std::fs::remove_file(&db_path).ok();

    let catalog = Arc::new(Catalog::new());
    let schema = Schema::builder()
        .column("id", DataType::Integer)
        .column("name", DataType::Char(24))
        .nullable_column("score", DataType::Double)
        .build_arc();
    let table = catalog.create_table("players", &db_path, schema.clone())?;
    println!(
        "Created table 'players' at {} ({} bytes per tuple)",
        db_path.display(),
        schema.tuple_size()
    );

    let pool = BufferPool::new(DEFAULT_BUFFER_POOL_SIZE, Arc::clone(&catalog));
    println!("Created buffer pool with {} pages\n", pool.capacity());

    // Committed inserts
    let t1 = TransactionId::new();
    let names = ["ada", "grace", "edsger", "barbara", "leslie"];
    for (i, name) in names.iter().enumerate() {
        let mut tuple = TupleBuilder::new(schema.clone())
            .value(i as i32)
            .value(*name)
            .value(i as f64 * 1.5)
            .build();
        let rid = pool.insert_tuple(t1, table.table_id(), &mut tuple)?;
        println!("{} inserted {} at {}", t1, name, rid);
    }
    pool.transaction_complete(t1, true)?;
    info!("{} committed", t1);

    // Delete one row, then abort: the row comes back
    let t2 = TransactionId::new();
    let victim = table
        .iter(&pool, t2)
        .find(|t| {
            t.as_ref()
                .map_or(true, |t| t.value(0) == Some(&Value::Integer(2)))
        })
        .transpose()?;
    if let Some(victim) = victim {
        pool.delete_tuple(t2, &victim)?;
        println!("\n{} deleted {:?}, then aborts", t2, victim.value_by_name("name"));
    }
    pool.transaction_complete(t2, false)?;

    let t3 = TransactionId::new();
    println!("\nScan as {}:", t3);
    for tuple in table.iter(&pool, t3) {
        let tuple = tuple?;
        let values: Vec<String> = tuple.values().iter().map(|v| v.to_string()).collect();
        println!("  {}", values.join(", "));
    }
    pool.transaction_complete(t3, true)?;

    let stats = pool.stats();
    println!(
        "\nPool stats: {} hits, {} misses, {} evictions; {} pages on disk",
        stats.hits,
        stats.misses,
        stats.evictions,
        table.num_pages()?
    );

    drop(pool);
    drop(table);
    drop(catalog);
    std::fs::remove_file(&db_path).ok();
    println!("\nDemo completed successfully!");
    Ok(())
}
