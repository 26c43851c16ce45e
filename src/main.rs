fn main() {
    gemini_gateway::run();
}
