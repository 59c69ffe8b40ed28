use filemap_cli::commands::FilemapCmd;

fn main() {
    FilemapCmd::run();
}
