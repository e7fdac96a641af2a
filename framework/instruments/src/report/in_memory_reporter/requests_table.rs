use tabled::Tabled;

#[derive(Tabled)]
pub struct RequestRow {
    pub request: String,
    pub ok: usize,
    pub ko: usize,
    #[tabled(display = "float2")]
    pub avg_time_ms: f64,
    pub min_time_ms: u64,
    pub max_time_ms: u64,
}

#[derive(Tabled)]
pub struct RecordRow {
    pub record: String,
    pub count: usize,
}

fn float2(n: &f64) -> String {
    format!("{:.2}", n)
}
