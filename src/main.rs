fn main() -> anyhow::Result<()> {
    naive_msm::run_from_args(std::env::args_os())
}
