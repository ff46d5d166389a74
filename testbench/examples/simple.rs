use testbench::*;

fn main() {
    let mat = generate_matrix(&TestPattern::Gradient, 64, 64).unwrap();
    let fd = std::fs::File::create("simple.bfps").unwrap();
    let mut writer = bivcodec::BfpsWriter::new(fd).unwrap();
    for _ in 0..10 {
        writer.write(&mat).unwrap();
    }
}
