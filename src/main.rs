fn main() -> Result<(), Box<dyn std::error::Error>> {
    aiterm::cli::main()
}
