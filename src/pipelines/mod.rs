pub mod fusion_calling;
