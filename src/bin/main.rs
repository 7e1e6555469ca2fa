fn main() {
    equipool::main()
}
