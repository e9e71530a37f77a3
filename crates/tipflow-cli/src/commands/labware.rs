use tipflow_core::StaticCatalog;

pub fn list() -> anyhow::Result<()> {
    let catalog = StaticCatalog::builtin();
    for def in catalog.kinds() {
        let role = if def.is_tiprack { "tips" } else { "labware" };
        println!(
            "{:<48} {:>4} wells  {:>8.1} µL  {:<7} {:.1} mm",
            def.kind,
            def.well_count(),
            def.capacity_per_well,
            role,
            def.height_mm
        );
    }
    Ok(())
}
